//! `genesys.conf` parsing and calibration-cache directory discovery.

use std::path::PathBuf;

/// One USB auto-attach entry from `genesys.conf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbAttach {
    pub vendor_id: u16,
    pub product_id: u16,
}

/// Parses a `genesys.conf`-style file: one `usb VENDOR_ID PRODUCT_ID` entry
/// per line, `#`-prefixed comments and blank lines ignored. A malformed line
/// is logged and skipped rather than treated as fatal, so one bad entry
/// never blocks the rest of the file from attaching devices.
pub fn parse_config(contents: &str) -> Vec<UsbAttach> {
    let mut attaches = Vec::new();
    for (lineno, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        match parse_line(line) {
            Some(attach) => attaches.push(attach),
            None => log::warn!("genesys.conf:{}: malformed line {:?}, skipping", lineno + 1, raw_line),
        }
    }
    attaches
}

fn parse_line(line: &str) -> Option<UsbAttach> {
    let mut parts = line.split_whitespace();
    if parts.next()? != "usb" {
        return None;
    }
    let vendor_id = parse_hex_or_dec(parts.next()?)?;
    let product_id = parse_hex_or_dec(parts.next()?)?;
    if parts.next().is_some() {
        return None;
    }
    Some(UsbAttach {
        vendor_id,
        product_id,
    })
}

fn parse_hex_or_dec(token: &str) -> Option<u16> {
    if let Some(hex) = token.strip_prefix("0x").or_else(|| token.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).ok()
    } else {
        token.parse().ok()
    }
}

/// Finds the directory the calibration cache lives under, following the
/// environment order `HOME`, `USERPROFILE`, `TMPDIR`, `TMP`. None of the
/// distilled behavior guarantees one of these is set, so as a last resort
/// we fall back to `.sane-genesys-cache` under the current directory and
/// log a warning — the backend degrades instead of panicking.
pub fn cache_dir() -> PathBuf {
    for var in ["HOME", "USERPROFILE", "TMPDIR", "TMP"] {
        if let Ok(value) = std::env::var(var) {
            if !value.is_empty() {
                return PathBuf::from(value).join(".sane");
            }
        }
    }
    log::warn!("no HOME/USERPROFILE/TMPDIR/TMP set; caching under ./.sane-genesys-cache");
    PathBuf::from(".sane-genesys-cache")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_and_decimal_entries() {
        let cfg = "# comment\nusb 0x04a9 0x190e\n\nusb 1200 6270\n";
        let attaches = parse_config(cfg);
        assert_eq!(
            attaches,
            vec![
                UsbAttach {
                    vendor_id: 0x04a9,
                    product_id: 0x190e
                },
                UsbAttach {
                    vendor_id: 1200,
                    product_id: 6270
                },
            ]
        );
    }

    #[test]
    fn skips_malformed_lines_without_failing() {
        let cfg = "usb 0x04a9\nusb 0x04a9 0x190e extra\nusb 0x04a9 0x190e\nnotusb 1 2\n";
        let attaches = parse_config(cfg);
        assert_eq!(attaches.len(), 1);
        assert_eq!(attaches[0].product_id, 0x190e);
    }
}
