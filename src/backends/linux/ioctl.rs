#![allow(non_camel_case_types)]

//! hidraw ioctl bindings (`<linux/hidraw.h>`).

use nix::{ioctl_read, libc::c_int};

pub const HID_MAX_DESCRIPTOR_SIZE: usize = 4096;

#[repr(C)]
pub struct hidraw_report_descriptor {
    pub size: u32,
    pub value: [u8; HID_MAX_DESCRIPTOR_SIZE],
}

impl Default for hidraw_report_descriptor {
    fn default() -> Self {
        Self {
            size: 0,
            value: [0; HID_MAX_DESCRIPTOR_SIZE],
        }
    }
}

impl hidraw_report_descriptor {
    pub fn get_value(&self) -> &[u8] {
        &self.value[..HID_MAX_DESCRIPTOR_SIZE.min(self.size as usize)]
    }
}

#[repr(C)]
#[derive(Debug, Default)]
pub struct hidraw_devinfo {
    pub bustype: u32,
    pub vendor: i16,
    pub product: i16,
}

ioctl_read!(hid_ioc_rd_desc_size, b'H', 0x01, c_int);
ioctl_read!(hid_ioc_rd_desc, b'H', 0x02, hidraw_report_descriptor);
ioctl_read!(hid_ioc_raw_info, b'H', 0x03, hidraw_devinfo);
