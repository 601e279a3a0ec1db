//! CPU affinity masks sized to the host's logical CPU count.

use std::fmt;

use serde::{Serialize, Serializer};

use crate::error::{PrlError, Result};

/// Fixed-width CPU bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CpuMask {
    bits: Vec<bool>,
}

impl CpuMask {
    /// Mask of `ncpus` bits, none set.
    pub fn empty(ncpus: usize) -> Self {
        Self { bits: vec![false; ncpus] }
    }

    /// Mask of `ncpus` bits, all set.
    pub fn full(ncpus: usize) -> Self {
        Self { bits: vec![true; ncpus] }
    }

    /// Parse the vendor's affinity text, e.g. `"0-3,6,^2"`.
    ///
    /// Empty text means "all host CPUs". CPU numbers at or above `ncpus` are
    /// rejected.
    pub fn parse(text: &str, ncpus: usize) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(Self::full(ncpus));
        }

        let invalid = |why: &str| {
            PrlError::InvalidData(format!("malformed CPU mask '{}': {}", text, why))
        };
        let cpu = |s: &str| -> Result<usize> {
            let n: usize = s
                .trim()
                .parse()
                .map_err(|_| invalid(&format!("'{}' is not a CPU number", s.trim())))?;
            if n >= ncpus {
                return Err(invalid(&format!("CPU {} exceeds host CPU count {}", n, ncpus)));
            }
            Ok(n)
        };

        let mut mask = Self::empty(ncpus);
        for item in text.split(',') {
            let item = item.trim();
            if item.is_empty() {
                return Err(invalid("empty list item"));
            }

            if let Some(negated) = item.strip_prefix('^') {
                mask.bits[cpu(negated)?] = false;
            } else if let Some((lo, hi)) = item.split_once('-') {
                let (lo, hi) = (cpu(lo)?, cpu(hi)?);
                if lo > hi {
                    return Err(invalid(&format!("descending range {}-{}", lo, hi)));
                }
                mask.bits[lo..=hi].iter_mut().for_each(|b| *b = true);
            } else {
                mask.bits[cpu(item)?] = true;
            }
        }

        Ok(mask)
    }

    /// Number of bits (host CPUs) in the mask.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn is_set(&self, cpu: usize) -> bool {
        self.bits.get(cpu).copied().unwrap_or(false)
    }

    pub fn count_set(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    pub fn is_all_set(&self) -> bool {
        self.bits.iter().all(|b| *b)
    }

    pub fn iter_set(&self) -> impl Iterator<Item = usize> + '_ {
        self.bits
            .iter()
            .enumerate()
            .filter_map(|(i, set)| set.then_some(i))
    }
}

impl fmt::Display for CpuMask {
    /// Compact range list, e.g. `0-3,6`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut cpus = self.iter_set().peekable();
        while let Some(start) = cpus.next() {
            let mut end = start;
            while cpus.peek() == Some(&(end + 1)) {
                end += 1;
                cpus.next();
            }
            if !first {
                f.write_str(",")?;
            }
            first = false;
            if start == end {
                write!(f, "{}", start)?;
            } else {
                write!(f, "{}-{}", start, end)?;
            }
        }
        Ok(())
    }
}

impl Serialize for CpuMask {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_text_sets_every_host_cpu() {
        let mask = CpuMask::parse("", 8).unwrap();
        assert_eq!(mask.len(), 8);
        assert_eq!(mask.count_set(), 8);
        assert!(mask.is_all_set());
    }

    #[test]
    fn test_parse_ranges_and_exclusions() {
        let mask = CpuMask::parse("0-3, 6,^2", 8).unwrap();
        assert_eq!(mask.iter_set().collect::<Vec<_>>(), vec![0, 1, 3, 6]);
        assert_eq!(mask.to_string(), "0-1,3,6");
    }

    #[test]
    fn test_parse_rejects_out_of_range_cpu() {
        assert!(CpuMask::parse("0-8", 8).is_err());
        assert!(CpuMask::parse("12", 8).is_err());
    }

    #[test]
    fn test_parse_rejects_malformed_text() {
        for bad in ["a", "1,,2", "3-1", "1-", "^", "-1"] {
            assert!(CpuMask::parse(bad, 8).is_err(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_display_full_mask() {
        assert_eq!(CpuMask::full(4).to_string(), "0-3");
        assert_eq!(CpuMask::empty(4).to_string(), "");
    }
}
