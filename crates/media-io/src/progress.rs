use once_cell::sync::Lazy;
use regex::Regex;

static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"time=(\d+:\d{1,2}:\d{1,2}(?:\.\d+)?)").expect("time pattern is valid")
});

const FRAME_MARKER: &str = "frame=";

/// What a chunk of ffmpeg's diagnostic stream tells us about progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParsedSignal {
    /// Elapsed output time in seconds.
    TimeSample(f64),
    /// The encoder is alive but the chunk carried no usable time.
    Heartbeat,
    None,
}

/// Parse one chunk of stderr output.
///
/// The stream is not message-delimited, so a chunk may hold several status
/// lines or a fragment of one. Only the most recent timestamp is reported.
pub fn parse_chunk(chunk: &str) -> ParsedSignal {
    let last = TIME_RE
        .captures_iter(chunk)
        .filter_map(|cap| parse_timestamp(&cap[1]))
        .last();

    match last {
        Some(seconds) => ParsedSignal::TimeSample(seconds),
        None if chunk.contains(FRAME_MARKER) => ParsedSignal::Heartbeat,
        None => ParsedSignal::None,
    }
}

/// Parse a bare `HH:MM:SS(.frac)` timestamp.
pub fn parse_timestamp(input: &str) -> Option<f64> {
    let mut parts = input.trim().split(':');
    let h: u64 = parts.next()?.parse().ok()?;
    let m: u64 = parts.next()?.parse().ok()?;
    let s: f64 = parts.next()?.parse().ok()?;
    if parts.next().is_some() || m >= 60 || !(0.0..60.0).contains(&s) {
        return None;
    }
    Some(h as f64 * 3600.0 + m as f64 * 60.0 + s)
}
