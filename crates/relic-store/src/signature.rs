use std::fmt;

/// Author/committer/tagger identity line:
/// `Name <email> <unix-seconds> <±HHMM>`.
///
/// The instant is kept as raw Unix seconds plus a fixed timezone offset in
/// minutes, which is exactly what the serialized form carries. No calendar
/// math happens in this crate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    /// Seconds since the Unix epoch, UTC.
    pub seconds: i64,
    /// Offset from UTC in minutes; `+0130` parses to `90`.
    pub offset_minutes: i32,
}

impl Signature {
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        seconds: i64,
        offset_minutes: i32,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            seconds,
            offset_minutes,
        }
    }

    /// Parse a signature value (everything after `author ` / `committer ` /
    /// `tagger `, without the trailing newline). Errors carry a bare reason;
    /// the object codecs wrap them into `MalformedObject`.
    pub(crate) fn parse(data: &[u8]) -> Result<Self, String> {
        let lt = data
            .iter()
            .position(|&b| b == b'<')
            .ok_or("missing '<' in signature")?;
        let name = std::str::from_utf8(&data[..lt.saturating_sub(1)])
            .map_err(|_| "signature name is not UTF-8")?
            .to_string();

        let rest = &data[lt + 1..];
        let gt = rest
            .iter()
            .position(|&b| b == b'>')
            .ok_or("missing '>' in signature")?;
        let email = std::str::from_utf8(&rest[..gt])
            .map_err(|_| "signature email is not UTF-8")?
            .to_string();

        let rest = rest
            .get(gt + 1..)
            .filter(|r| r.first() == Some(&b' '))
            .ok_or("missing timestamp in signature")?;
        let rest = &rest[1..];
        let space = rest
            .iter()
            .position(|&b| b == b' ')
            .ok_or("missing timezone in signature")?;
        let seconds = std::str::from_utf8(&rest[..space])
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .ok_or("invalid timestamp in signature")?;

        let offset_minutes = parse_offset(&rest[space + 1..])?;
        Ok(Self {
            name,
            email,
            seconds,
            offset_minutes,
        })
    }
}

/// `±HHMM` to signed minutes.
fn parse_offset(tz: &[u8]) -> Result<i32, String> {
    if tz.len() != 5 {
        return Err(format!(
            "timezone must be 5 bytes, got {:?}",
            String::from_utf8_lossy(tz)
        ));
    }
    let sign = match tz[0] {
        b'+' => 1,
        b'-' => -1,
        _ => return Err("timezone must start with '+' or '-'".into()),
    };
    for &b in &tz[1..] {
        if !b.is_ascii_digit() {
            return Err("timezone digits must be 0-9".into());
        }
    }
    let hours = i32::from(tz[1] - b'0') * 10 + i32::from(tz[2] - b'0');
    let minutes = i32::from(tz[3] - b'0') * 10 + i32::from(tz[4] - b'0');
    Ok(sign * (hours * 60 + minutes))
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.offset_minutes < 0 { '-' } else { '+' };
        let abs = self.offset_minutes.unsigned_abs();
        write!(
            f,
            "{} <{}> {} {}{:02}{:02}",
            self.name,
            self.email,
            self.seconds,
            sign,
            abs / 60,
            abs % 60
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_plain_signature() {
        let sig = Signature::parse(b"A U Thor <author@example.com> 1700000000 +0900").unwrap();
        assert_eq!(sig.name, "A U Thor");
        assert_eq!(sig.email, "author@example.com");
        assert_eq!(sig.seconds, 1_700_000_000);
        assert_eq!(sig.offset_minutes, 540);
    }

    #[test]
    fn parse_negative_offset() {
        let sig = Signature::parse(b"Dev <d@e.f> 123 -0130").unwrap();
        assert_eq!(sig.offset_minutes, -90);
    }

    #[test]
    fn parse_empty_name() {
        let sig = Signature::parse(b"<a@b> 0 +0000").unwrap();
        assert_eq!(sig.name, "");
        assert_eq!(sig.email, "a@b");
    }

    #[test]
    fn display_round_trips() {
        for raw in [
            "A U Thor <author@example.com> 1700000000 +0000",
            "Dev One <dev@example.com> 987654321 -0800",
            "Tz Edge <tz@example.com> 1 +1345",
        ] {
            let sig = Signature::parse(raw.as_bytes()).unwrap();
            assert_eq!(sig.to_string(), raw);
        }
    }

    #[test]
    fn rejects_malformed_lines() {
        assert!(Signature::parse(b"no brackets at all").is_err());
        assert!(Signature::parse(b"Name <unterminated 1 +0000").is_err());
        assert!(Signature::parse(b"Name <a@b>1 +0000").is_err());
        assert!(Signature::parse(b"Name <a@b> notanumber +0000").is_err());
        assert!(Signature::parse(b"Name <a@b> 1 0000").is_err());
        assert!(Signature::parse(b"Name <a@b> 1 +00").is_err());
        assert!(Signature::parse(b"Name <a@b> 1").is_err());
    }
}
