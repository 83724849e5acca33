//! # Status Page Server
//!
//! Minimal HTTP endpoint: one request per connection, two control paths and
//! a rendered status page for everything else. There is no routing table and
//! no header parsing beyond the request path; a browser hitting the root
//! gets the page, the two form buttons hit `/lighton?` and `/lightoff?`.

use core::fmt::{self, Write as FmtWrite};

use embedded_hal::digital::OutputPin;
use embedded_io_async::{Read, Write};
use heapless::String;

use crate::command::{Command, LedControl};
use crate::metrics::c_to_f;

/// Rendered page plus headers fit comfortably in this.
pub const PAGE_BUF_LEN: usize = 1024;

const RESPONSE_HEADER: &str =
    "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n";

/// What the request path asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum PageRequest {
    LightOn,
    LightOff,
    /// Any other path, including `/`. Renders the page without touching the
    /// LED.
    Status,
}

/// Pulls the path out of the request line. Tolerates arbitrary junk: a
/// request with no second token is a plain status request.
pub fn parse_request(raw: &[u8]) -> PageRequest {
    let mut tokens = raw.split(|b| b.is_ascii_whitespace()).filter(|t| !t.is_empty());
    let _method = tokens.next();
    match tokens.next() {
        Some(b"/lighton?") => PageRequest::LightOn,
        Some(b"/lightoff?") => PageRequest::LightOff,
        _ => PageRequest::Status,
    }
}

/// The values shown on the status page, captured by the telemetry loop.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusSnapshot {
    /// Latest ambient temperature, Celsius.
    pub temperature_c: f32,
    /// Rolling average over the recent history window, Celsius.
    pub adjusted_temperature_c: f32,
    /// On-die temperature, Celsius.
    pub cpu_temperature_c: f32,
    pub led_on: bool,
}

/// Renders the status page into a caller-provided buffer.
pub fn render_page<const N: usize>(
    snapshot: &StatusSnapshot,
    out: &mut String<N>,
) -> fmt::Result {
    let state = if snapshot.led_on { "ON" } else { "OFF" };
    write!(
        out,
        "<!DOCTYPE html>\
         <html>\
         <head></head>\
         <body style=\"background-color:black;color:gray;\">\
         <h1>Weather Station</h1>\
         <form action=\"./lighton\"><input type=\"submit\" value=\"Light on\" /></form>\
         <form action=\"./lightoff\"><input type=\"submit\" value=\"Light off\" /></form>\
         <p>LED is {state}</p>\
         <p>Temperature: {t:.2} C ({tf:.2} F)<br>\
         Adjusted temp: {a:.2} C ({af:.2} F)<br>\
         CPU temp: {c:.2} C ({cf:.2} F)</p>\
         </body>\
         </html>",
        t = snapshot.temperature_c,
        tf = c_to_f(snapshot.temperature_c),
        a = snapshot.adjusted_temperature_c,
        af = c_to_f(snapshot.adjusted_temperature_c),
        c = snapshot.cpu_temperature_c,
        cf = c_to_f(snapshot.cpu_temperature_c),
    )
}

/// Handles one accepted connection end to end: read the request, apply any
/// LED command, write the page, done. The caller closes the socket.
///
/// Pin faults are logged and the page is served anyway; a broken LED should
/// not take the status endpoint down with it.
pub async fn serve<S, P>(
    socket: &mut S,
    led: &mut LedControl<P>,
    snapshot: &StatusSnapshot,
) -> Result<PageRequest, S::Error>
where
    S: Read + Write,
    P: OutputPin,
{
    let mut request = [0u8; 512];
    let n = socket.read(&mut request).await?;
    let page_request = parse_request(&request[..n]);

    let command = match page_request {
        PageRequest::LightOn => Some(Command::LedOn),
        PageRequest::LightOff => Some(Command::LedOff),
        PageRequest::Status => None,
    };
    if let Some(command) = command {
        if led.apply(&command).is_err() {
            log::warn!("indicator pin fault while handling {page_request:?}");
        }
    }

    let mut page: String<PAGE_BUF_LEN> = String::new();
    let mut shown = *snapshot;
    shown.led_on = led.is_on();
    if render_page(&shown, &mut page).is_err() {
        // The fixed template always fits; reaching this means the buffer
        // constant regressed.
        log::error!("status page overflowed its buffer");
        page.clear();
    }

    socket.write_all(RESPONSE_HEADER.as_bytes()).await?;
    socket.write_all(page.as_bytes()).await?;
    socket.flush().await?;
    Ok(page_request)
}
