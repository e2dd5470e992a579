use std::net::Ipv4Addr;

use crate::error::{Result, SnifferError};

/// Inclusive range of IPv4 addresses sharing their first three octets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressRange {
    prefix: [u8; 3],
    first: u8,
    last: u8,
}

impl AddressRange {
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let start_addr = parse_address(start, "start")?;
        let end_addr = parse_address(end, "end")?;
        let [a, b, c, first] = start_addr.octets();
        let [x, y, z, last] = end_addr.octets();

        if [a, b, c] != [x, y, z] {
            return Err(SnifferError::invalid(format!(
                "start and end addresses must share the first three octets ({start} vs {end})"
            )));
        }
        if last < first {
            return Err(SnifferError::invalid(format!(
                "end address {end} precedes start address {start}"
            )));
        }

        Ok(Self {
            prefix: [a, b, c],
            first,
            last,
        })
    }

    pub fn len(&self) -> usize {
        usize::from(self.last - self.first) + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn addresses(&self) -> impl Iterator<Item = String> + '_ {
        let [a, b, c] = self.prefix;
        (self.first..=self.last).map(move |d| Ipv4Addr::new(a, b, c, d).to_string())
    }
}

fn parse_address(raw: &str, which: &str) -> Result<Ipv4Addr> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(SnifferError::invalid(format!("{which} address is required")));
    }
    trimmed
        .parse::<Ipv4Addr>()
        .map_err(|_| SnifferError::invalid(format!("invalid {which} address: {raw}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expands_inclusive_range() {
        let range = AddressRange::parse("10.0.0.1", "10.0.0.3").expect("range");
        assert_eq!(range.len(), 3);
        assert_eq!(
            range.addresses().collect::<Vec<_>>(),
            vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]
        );

        let single = AddressRange::parse("239.1.1.9", "239.1.1.9").expect("single");
        assert_eq!(single.len(), 1);

        let full = AddressRange::parse("239.1.1.0", "239.1.1.255").expect("full");
        assert_eq!(full.len(), 256);
    }

    #[test]
    fn rejects_malformed_or_reversed_ranges() {
        for (start, end) in [
            ("10.0.0.5", "10.0.0.1"),
            ("10.0.0.1", "10.0.1.5"),
            ("10.0.0", "10.0.0.5"),
            ("", "10.0.0.5"),
            ("10.0.0.1", "10.0.0.300"),
        ] {
            assert!(
                matches!(AddressRange::parse(start, end), Err(SnifferError::InvalidRequest(_))),
                "{start}..{end} should be rejected"
            );
        }
    }
}
