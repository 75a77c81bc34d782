//! Device match criteria.
//!
//! Each of vendor ID, product ID, usage page and usage is either "don't care"
//! (`None`, written as `0` in configs and on the command line) or an exact
//! match. A candidate is selected only when every specified field matches.

use crate::metadata::DeviceAttributes;
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchCriteria {
    pub vendor_id: Option<u16>,
    pub product_id: Option<u16>,
    pub usage_page: Option<u16>,
    pub usage: Option<u16>,
}

#[inline]
fn care(v: u16) -> Option<u16> {
    (v != 0).then_some(v)
}

#[inline]
fn field_matches(want: Option<u16>, have: Option<u16>) -> bool {
    match want {
        None => true,
        Some(w) => have == Some(w),
    }
}

impl MatchCriteria {
    /// Matches every device.
    pub fn any() -> Self {
        Self::default()
    }

    /// Builds criteria from raw values where `0` means "don't care".
    pub fn new(vendor_id: u16, product_id: u16, usage_page: u16, usage: u16) -> Self {
        Self {
            vendor_id: care(vendor_id),
            product_id: care(product_id),
            usage_page: care(usage_page),
            usage: care(usage),
        }
    }

    pub fn vendor_id(mut self, v: u16) -> Self {
        self.vendor_id = care(v);
        self
    }

    pub fn product_id(mut self, v: u16) -> Self {
        self.product_id = care(v);
        self
    }

    pub fn usage_page(mut self, v: u16) -> Self {
        self.usage_page = care(v);
        self
    }

    pub fn usage(mut self, v: u16) -> Self {
        self.usage = care(v);
        self
    }

    /// `true` if a usage page or usage constraint is present.
    pub fn wants_usage(&self) -> bool {
        self.usage_page.is_some() || self.usage.is_some()
    }

    /// Checks vendor/product only. Backends use this to reject a candidate
    /// before paying for a capability query.
    pub fn matches_ids(&self, vendor_id: u16, product_id: u16) -> bool {
        field_matches(self.vendor_id, Some(vendor_id))
            && field_matches(self.product_id, Some(product_id))
    }

    /// Checks usage page/usage only.
    pub fn matches_usage(&self, usage_page: Option<u16>, usage: Option<u16>) -> bool {
        field_matches(self.usage_page, usage_page) && field_matches(self.usage, usage)
    }

    pub fn matches(&self, attrs: &DeviceAttributes) -> bool {
        self.matches_ids(attrs.vendor_id, attrs.product_id)
            && self.matches_usage(attrs.usage_page, attrs.usage)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn dev(vid: u16, pid: u16, up: Option<u16>, u: Option<u16>) -> DeviceAttributes {
        DeviceAttributes::new(vid, pid).with_usage(up, u)
    }

    #[test]
    fn zero_means_dont_care() {
        let c = MatchCriteria::new(0, 0, 0xff31, 0x74);
        assert_eq!(c.vendor_id, None);
        assert_eq!(c.product_id, None);
        assert_eq!(c.usage_page, Some(0xff31));
        assert_eq!(c.usage, Some(0x74));
        assert_eq!(MatchCriteria::new(0, 0, 0, 0), MatchCriteria::any());
    }

    #[test]
    fn all_specified_fields_must_match() {
        let c = MatchCriteria::any().vendor_id(0x16c0).usage_page(0xff31);
        assert!(c.matches(&dev(0x16c0, 0x0479, Some(0xff31), Some(0x74))));
        assert!(!c.matches(&dev(0x16c0, 0x0479, Some(0x0001), Some(0x74))));
        assert!(!c.matches(&dev(0x046d, 0x0479, Some(0xff31), Some(0x74))));
    }

    #[test]
    fn unknown_usage_never_satisfies_a_constraint() {
        let c = MatchCriteria::any().usage(0x74);
        assert!(!c.matches(&dev(1, 2, Some(0xff31), None)));
        assert!(MatchCriteria::any().vendor_id(1).matches(&dev(1, 2, None, None)));
    }

    #[test]
    fn dont_care_fields_never_affect_outcome() {
        let c = MatchCriteria::any().usage_page(0xff31).usage(0x74);
        for vid in [0u16, 1, 0x16c0, 0xffff] {
            for pid in [0u16, 0x0479, 0xffff] {
                assert!(c.matches(&dev(vid, pid, Some(0xff31), Some(0x74))));
                assert!(!c.matches(&dev(vid, pid, Some(0xff31), Some(0x75))));
            }
        }

        let c = MatchCriteria::any().vendor_id(0x16c0);
        for up in [None, Some(0x01), Some(0xff31)] {
            for u in [None, Some(0x06), Some(0x74)] {
                assert!(c.matches(&dev(0x16c0, 0x0479, up, u)));
            }
        }
    }
}
