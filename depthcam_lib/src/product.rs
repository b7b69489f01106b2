//! Product classes and firmware image identities
//!
//! Mirrors the product-class bitmask the SDK uses to filter device queries.
//! Recovery-mode devices enumerate under their own class, not the class of
//! their product line.

use num_derive::FromPrimitive;

/// Single product classes as defined by the SDK
#[non_exhaustive]
#[derive(Debug, PartialEq, Eq, FromPrimitive, Clone, Copy)]
#[repr(u8)]
pub enum ProductClass {
    NonVendor = 0x01,
    D400 = 0x02,
    Sr300 = 0x04,
    L500 = 0x08,
    T200 = 0x10,
    D400Recovery = 0x20,
}

/// Matches every device
pub const ANY: u8 = 0xFF;
/// Matches every device from the camera vendor
pub const ANY_VENDOR: u8 = 0xFE;
/// All depth camera product lines
pub const DEPTH: u8 =
    ProductClass::D400 as u8 | ProductClass::Sr300 as u8 | ProductClass::L500 as u8;
/// Tracking camera product line
pub const TRACKING: u8 = ProductClass::T200 as u8;

impl ProductClass {
    pub fn matches(self, mask: u8) -> bool {
        self as u8 & mask != 0
    }
}

/// Which bundled firmware image applies to a product line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FirmwareImageId {
    D4xx,
    Sr3xx,
}

impl FirmwareImageId {
    /// Fixed lookup from the product-line string the device reports.
    /// Unknown product lines have no image and are not updatable.
    pub fn for_product_line(line: &str) -> Option<Self> {
        match line {
            "D400" => Some(FirmwareImageId::D4xx),
            "SR300" => Some(FirmwareImageId::Sr3xx),
            _ => None,
        }
    }

    /// File name the image store looks for unless configured otherwise
    pub fn default_file_name(self) -> &'static str {
        match self {
            FirmwareImageId::D4xx => "fw_d4xx.bin",
            FirmwareImageId::Sr3xx => "fw_sr3xx.bin",
        }
    }
}
