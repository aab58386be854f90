use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A 1-based inclusive interval, `chrom:start-end`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
}

fn parse_coord(s: &str, region: &str) -> Result<u64, Error> {
    s.replace(',', "").parse::<u64>().map_err(|e| Error::Parse {
        string: region.to_string(),
        context: "region",
        reason: format!("bad coordinate \"{}\": {}", s, e),
    })
}

impl FromStr for Region {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: &str| Error::Parse {
            string: s.to_string(),
            context: "region",
            reason: reason.to_string(),
        };

        // contig names may contain ':', the interval follows the last one
        let (chrom, interval) = s.rsplit_once(':').ok_or_else(|| invalid("expected chr:start-end"))?;
        if chrom.is_empty() {
            return Err(invalid("empty chromosome name"));
        }
        let (start, end) = interval
            .split_once('-')
            .ok_or_else(|| invalid("expected chr:start-end"))?;
        let start = parse_coord(start, s)?;
        let end = parse_coord(end, s)?;
        if start == 0 {
            return Err(invalid("coordinates are 1-based"));
        }
        if start > end {
            return Err(invalid("start is after end"));
        }

        Ok(Region {
            chrom: chrom.to_string(),
            start,
            end,
        })
    }
}

/// Renders the samtools region syntax; names containing ':' are braced.
impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.chrom.contains(':') {
            write!(f, "{{{}}}:{}-{}", self.chrom, self.start, self.end)
        } else {
            write!(f, "{}:{}-{}", self.chrom, self.start, self.end)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_region() {
        let region: Region = "chr7:55,019,017-55,211,628".parse().unwrap();
        assert_eq!(region.chrom, "chr7");
        assert_eq!(region.start, 55_019_017);
        assert_eq!(region.end, 55_211_628);
        assert_eq!(region.to_string(), "chr7:55019017-55211628");
    }

    #[test]
    fn chrom_may_contain_colon() {
        let region: Region = "HLA-A*01:01:1-500".parse().unwrap();
        assert_eq!(region.chrom, "HLA-A*01:01");
        assert_eq!(region.end, 500);
        assert_eq!(region.to_string(), "{HLA-A*01:01}:1-500");
    }

    #[test]
    fn rejects_malformed_regions() {
        for bad in ["chr1", "chr1:100", ":1-10", "chr1:0-10", "chr1:20-10", "chr1:a-10"] {
            assert!(bad.parse::<Region>().is_err(), "{} should not parse", bad);
        }
    }
}
