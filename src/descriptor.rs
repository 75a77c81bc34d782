//! Report descriptor signature.
//!
//! Where the host gives us the raw report descriptor but no usage/usage-page
//! capability data (Linux hidraw), a device is recognised by the fixed prefix
//! its descriptor starts with: a Usage Page item followed by a Usage item.
//! For the PJRC debug interface that prefix is `06 31 FF 09 74`.
//!
//! Only these two leading items are looked at. Nothing after them (collections,
//! report IDs, field layouts) is interpreted.
//!
//! ## References
//!
//! * [Device Class Definition for Human Interface Devices, v1.11][0],
//!   §6.2.2.7 "Global Items" and §6.2.2.8 "Local Items"
//!
//! [0]: https://www.usb.org/sites/default/files/documents/hid1_11.pdf

/// Short-item prefix bytes, with the `bSize` bits masked off.
#[allow(clippy::unusual_byte_groupings)] // groupings are bTag(4), bType(2), bSize(2)
const TAG_USAGE_PAGE: u8 = 0b0000_01_00;
#[allow(clippy::unusual_byte_groupings)]
const TAG_USAGE: u8 = 0b0000_10_00;

/// Splits one short item off the front: `(tag and type bits, value, rest)`.
fn short_item(i: &[u8]) -> Option<(u8, &[u8], &[u8])> {
    let (&prefix, rest) = i.split_first()?;
    if prefix == 0xfe {
        // Long item; never part of a signature.
        return None;
    }
    let len = match prefix & 0x03 {
        3 => 4,
        n => usize::from(n),
    };
    if rest.len() < len {
        return None;
    }
    let (value, rest) = rest.split_at(len);
    Some((prefix & 0xfc, value, rest))
}

fn le_value(v: &[u8]) -> Option<u32> {
    match v.len() {
        1 => Some(u32::from(v[0])),
        2 => Some(u32::from(u16::from_le_bytes([v[0], v[1]]))),
        4 => Some(u32::from_le_bytes([v[0], v[1], v[2], v[3]])),
        _ => None,
    }
}

/// Reads the usage page and usage from the start of a report descriptor.
///
/// Returns `(None, None)` when the descriptor does not open with a Usage Page
/// item. A 4-byte Usage carries its own page in the high half, which wins
/// over the preceding Usage Page item.
pub fn leading_usage(descriptor: &[u8]) -> (Option<u16>, Option<u16>) {
    let Some((TAG_USAGE_PAGE, page, rest)) = short_item(descriptor) else {
        return (None, None);
    };
    let Some(page) = le_value(page).map(|p| p as u16) else {
        return (None, None);
    };

    match short_item(rest) {
        Some((TAG_USAGE, usage, _)) if usage.len() == 4 => match le_value(usage) {
            Some(v) => (Some((v >> 16) as u16), Some(v as u16)),
            None => (Some(page), None),
        },
        Some((TAG_USAGE, usage, _)) => (Some(page), le_value(usage).map(|u| u as u16)),
        _ => (Some(page), None),
    }
}

/// Builds the canonical signature prefix for a usage page and usage: a
/// 2-byte Usage Page item and the smallest Usage item that holds `usage`.
pub fn signature(usage_page: u16, usage: u16) -> Vec<u8> {
    let [lo, hi] = usage_page.to_le_bytes();
    let mut sig = vec![TAG_USAGE_PAGE | 0x02, lo, hi];
    if usage <= 0xff {
        sig.extend([TAG_USAGE | 0x01, usage as u8]);
    } else {
        let [lo, hi] = usage.to_le_bytes();
        sig.extend([TAG_USAGE | 0x02, lo, hi]);
    }
    sig
}

#[cfg(test)]
mod test {
    use super::*;

    macro_rules! leading_usage_tests {
        ($($name:ident: $expected:expr, $value:expr;)*) => {
        $(
            #[test]
            fn $name() -> std::result::Result<(), Box<dyn std::error::Error>> {
                let descriptor = hex::decode($value)?;
                assert_eq!($expected, leading_usage(&descriptor));
                Ok(())
            }
        )*
        }
    }

    leading_usage_tests! {
        // Teensy USB debug interface
        pjrc_debug: (Some(0xff31), Some(0x74)), "0631ff0974a10109751500";
        // FIDO U2F; 2 byte usage page + 1 byte usage
        fido: (Some(0xf1d0), Some(0x01)), "06d0f10901a1010920150026ff00";
        keyboard: (Some(0x01), Some(0x06)), "05010906a101050719e029e7";
        two_byte_usage: (Some(0x0c), Some(0x0238)), "050c0a3802a101";
        extended_usage: (Some(0xff00), Some(0x01)), "05010b010000ffa101";
        page_without_usage: (Some(0xff31), None), "0631ffa101";

        starts_with_collection: (None, None), "a1010631ff0974";
        empty: (None, None), "";
        truncated_page: (None, None), "06";
        truncated_usage: (Some(0xff31), None), "0631ff09";
        long_item: (None, None), "fe0201aabb";
    }

    #[test]
    fn pjrc_signature() {
        assert_eq!(signature(0xff31, 0x74), vec![0x06, 0x31, 0xff, 0x09, 0x74]);
        assert_eq!(signature(0x000c, 0x0238), vec![0x06, 0x0c, 0x00, 0x0a, 0x38, 0x02]);
    }

    #[test]
    fn signature_reads_back() {
        for (up, u) in [(0xff31, 0x74), (0x0001, 0x0006), (0xf1d0, 0x0001), (0x000c, 0x0238)] {
            assert_eq!(leading_usage(&signature(up, u)), (Some(up), Some(u)));
        }
    }
}
