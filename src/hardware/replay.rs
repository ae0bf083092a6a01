//! Line-oriented replay of input samples
//!
//! Each non-empty line is one 8-bit sample, written as binary (`0b0010_0100`),
//! hex (`0x24`) or decimal (`36`). `#` starts a comment. A reader thread
//! parses lines into a `ScriptedInputs` source; end of input closes the feed,
//! which the watcher sees as the board disconnecting.

use super::ScriptedInputs;
use std::io::{self, BufRead};
use std::thread;

/// Parse one sample line. `Ok(None)` for blank and comment lines.
pub fn parse_sample(line: &str) -> Result<Option<u8>, String> {
    let text = line.split('#').next().unwrap_or("").trim();
    if text.is_empty() {
        return Ok(None);
    }

    let cleaned = text.replace('_', "");
    let lower = cleaned.to_lowercase();
    let parsed = if let Some(bits) = lower.strip_prefix("0b") {
        u8::from_str_radix(bits, 2)
    } else if let Some(hex) = lower.strip_prefix("0x") {
        u8::from_str_radix(hex, 16)
    } else {
        lower.parse::<u8>()
    };

    parsed
        .map(Some)
        .map_err(|e| format!("invalid sample '{}': {}", text, e))
}

/// Spawn a reader thread feeding samples from `reader` into a new source.
///
/// The source's baseline is `initial`; the first parsed line is the first
/// change notification.
pub fn spawn_line_feed<R>(name: &str, initial: u8, reader: R) -> io::Result<ScriptedInputs>
where
    R: BufRead + Send + 'static,
{
    let (source, feed) = ScriptedInputs::new(name, initial);
    let label = name.to_string();

    thread::Builder::new()
        .name("replay-feed".to_string())
        .spawn(move || {
            let mut delivered = 0u64;
            for (number, line) in reader.lines().enumerate() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        log::warn!("replay {}: read error at line {}: {}", label, number + 1, e);
                        break;
                    }
                };
                match parse_sample(&line) {
                    Ok(Some(sample)) => {
                        if !feed.push(sample) {
                            break;
                        }
                        delivered += 1;
                    }
                    Ok(None) => {}
                    Err(e) => log::warn!("replay {}: line {}: {}", label, number + 1, e),
                }
            }
            log::info!("replay {}: end of input after {} samples", label, delivered);
        })?;

    Ok(source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::{InputSource, WaitOutcome};
    use std::io::Cursor;
    use std::time::Duration;

    #[test]
    fn test_parse_sample_formats() {
        assert_eq!(parse_sample("0b0010_0100"), Ok(Some(0x24)));
        assert_eq!(parse_sample("0x24"), Ok(Some(0x24)));
        assert_eq!(parse_sample("0XFF"), Ok(Some(0xFF)));
        assert_eq!(parse_sample("36"), Ok(Some(36)));
        assert_eq!(parse_sample("  7  # pin 0-2 high"), Ok(Some(7)));
        assert_eq!(parse_sample(""), Ok(None));
        assert_eq!(parse_sample("# comment"), Ok(None));
        assert!(parse_sample("256").is_err());
        assert!(parse_sample("0b2").is_err());
    }

    #[test]
    fn test_line_feed_delivers_then_disconnects() {
        let input = Cursor::new("0x01\n\nbogus\n0x00\n");
        let mut source = spawn_line_feed("cursor", 0, input).unwrap();
        source.control().enable_interrupts().unwrap();

        let timeout = Some(Duration::from_secs(2));
        assert_eq!(source.wait_for_change(timeout), WaitOutcome::Changed(0x01));
        assert_eq!(source.wait_for_change(timeout), WaitOutcome::Changed(0x00));
        assert!(matches!(source.wait_for_change(timeout), WaitOutcome::Error(_)));
    }
}
