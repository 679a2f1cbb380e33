//! HDMI Mode Wire Format
//!
//! The compositor writes mode lists into client supplied shared memory using
//! a fixed C layout:
//!
//! ```text
//! HdmiInfo_t  { int32 xres; int32 yres; int32 refresh; int32 interlaced; int32 reserved[3]; }  // 28 bytes
//! HdmiInfos_t { int32 count; HdmiInfo_t hdmi_info[100]; }                                       // 2804 bytes
//! ```
//!
//! All integers are host byte order. [`HdmiInfo`] and [`HdmiInfos`] are
//! `#[repr(C)]` mirrors of those structs and are what the C ABI hands to
//! callers. Inside the crate mode lists travel as [`ModeList`], which is only
//! converted to the fixed layout at the boundary.

use std::fmt;
use std::str::FromStr;

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::error::{DisplayConfigError, Result};

/// Capacity of the `hdmi_info` array
pub const MAX_HDMI_MODES: usize = 100;

/// Size of one `HdmiInfo_t` on the wire
pub const HDMI_INFO_SIZE: usize = 7 * 4;

/// Size of one `HdmiInfos_t` on the wire
pub const HDMI_INFOS_SIZE: usize = 4 + MAX_HDMI_MODES * HDMI_INFO_SIZE;

const _: () = assert!(std::mem::size_of::<HdmiInfo>() == HDMI_INFO_SIZE);
const _: () = assert!(std::mem::size_of::<HdmiInfos>() == HDMI_INFOS_SIZE);

/// One HDMI timing descriptor (`HdmiInfo_t`)
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HdmiInfo {
    /// Horizontal resolution in pixels
    pub xres: i32,
    /// Vertical resolution in pixels
    pub yres: i32,
    /// Refresh rate in mHz (60000 = 60 Hz)
    pub refresh: i32,
    /// Non-zero for interlaced modes
    pub interlaced: i32,
    /// Unused by the client, carried through unchanged
    pub reserved: [i32; 3],
}

impl HdmiInfo {
    /// Create a descriptor with zeroed reserved fields
    pub fn new(xres: i32, yres: i32, refresh: i32, interlaced: bool) -> Self {
        Self {
            xres,
            yres,
            refresh,
            interlaced: i32::from(interlaced),
            reserved: [0; 3],
        }
    }

    /// Whether the compositor flagged this mode as interlaced
    pub fn is_interlaced(&self) -> bool {
        self.interlaced != 0
    }

    /// Exact match on width, height, refresh and interlace flag
    pub fn matches(&self, request: &ModeRequest) -> bool {
        self.xres == request.width
            && self.yres == request.height
            && self.refresh == request.refresh
            && self.interlaced == request.interlaced
    }

    fn decode(buf: &mut impl Buf) -> Self {
        Self {
            xres: buf.get_i32_ne(),
            yres: buf.get_i32_ne(),
            refresh: buf.get_i32_ne(),
            interlaced: buf.get_i32_ne(),
            reserved: [buf.get_i32_ne(), buf.get_i32_ne(), buf.get_i32_ne()],
        }
    }

    fn encode(&self, buf: &mut impl BufMut) {
        buf.put_i32_ne(self.xres);
        buf.put_i32_ne(self.yres);
        buf.put_i32_ne(self.refresh);
        buf.put_i32_ne(self.interlaced);
        for reserved in self.reserved {
            buf.put_i32_ne(reserved);
        }
    }
}

impl fmt::Display for HdmiInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{}{}@{}.{:03}Hz",
            self.xres,
            self.yres,
            if self.is_interlaced() { "i" } else { "" },
            self.refresh / 1000,
            (self.refresh % 1000).abs()
        )
    }
}

/// Mode list as laid out in shared memory (`HdmiInfos_t`)
///
/// Entries at or beyond `count` are unspecified. `count` itself is whatever
/// the compositor wrote and is not validated here; use [`HdmiInfos::modes`]
/// or convert to a [`ModeList`] for a bounded view.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct HdmiInfos {
    /// Number of valid entries in `hdmi_info`
    pub count: i32,
    /// Fixed-capacity descriptor array
    pub hdmi_info: [HdmiInfo; MAX_HDMI_MODES],
}

impl Default for HdmiInfos {
    fn default() -> Self {
        Self {
            count: 0,
            hdmi_info: [HdmiInfo::default(); MAX_HDMI_MODES],
        }
    }
}

impl fmt::Debug for HdmiInfos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HdmiInfos")
            .field("count", &self.count)
            .field("hdmi_info", &self.modes())
            .finish()
    }
}

impl HdmiInfos {
    /// Decode the fixed layout from the start of `bytes`
    ///
    /// Trailing bytes (the rest of the shared-memory buffer) are ignored.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HDMI_INFOS_SIZE {
            return Err(DisplayConfigError::Truncated {
                required: HDMI_INFOS_SIZE,
                actual: bytes.len(),
            });
        }

        let mut buf = &bytes[..HDMI_INFOS_SIZE];
        let mut infos = Self {
            count: buf.get_i32_ne(),
            ..Self::default()
        };
        for slot in infos.hdmi_info.iter_mut() {
            *slot = HdmiInfo::decode(&mut buf);
        }

        Ok(infos)
    }

    /// Encode into the fixed layout
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(HDMI_INFOS_SIZE);
        buf.put_i32_ne(self.count);
        for info in &self.hdmi_info {
            info.encode(&mut buf);
        }
        buf
    }

    /// Encode into the start of `dst`
    pub fn write_to(&self, dst: &mut [u8]) -> Result<()> {
        if dst.len() < HDMI_INFOS_SIZE {
            return Err(DisplayConfigError::Truncated {
                required: HDMI_INFOS_SIZE,
                actual: dst.len(),
            });
        }
        dst[..HDMI_INFOS_SIZE].copy_from_slice(&self.to_bytes());
        Ok(())
    }

    /// Number of entries that can be trusted, `count` clamped to `0..=100`
    pub fn valid_len(&self) -> usize {
        self.count.clamp(0, MAX_HDMI_MODES as i32) as usize
    }

    /// The valid entries
    pub fn modes(&self) -> &[HdmiInfo] {
        &self.hdmi_info[..self.valid_len()]
    }
}

/// Growable, ordered mode list used inside the crate
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModeList(Vec<HdmiInfo>);

impl ModeList {
    /// Create an empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a mode
    pub fn push(&mut self, mode: HdmiInfo) {
        self.0.push(mode);
    }

    /// Number of modes
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Modes in compositor order
    pub fn as_slice(&self) -> &[HdmiInfo] {
        &self.0
    }

    /// Iterate modes in compositor order
    pub fn iter(&self) -> std::slice::Iter<'_, HdmiInfo> {
        self.0.iter()
    }

    /// First mode matching `request` exactly
    pub fn find(&self, request: &ModeRequest) -> Option<&HdmiInfo> {
        self.0.iter().find(|mode| mode.matches(request))
    }
}

impl From<&HdmiInfos> for ModeList {
    fn from(infos: &HdmiInfos) -> Self {
        if infos.count < 0 || infos.count as usize > MAX_HDMI_MODES {
            warn!(
                "Compositor reported {} HDMI modes, clamping to {}",
                infos.count,
                infos.valid_len()
            );
        }
        Self(infos.modes().to_vec())
    }
}

impl TryFrom<&ModeList> for HdmiInfos {
    type Error = DisplayConfigError;

    fn try_from(list: &ModeList) -> Result<Self> {
        if list.len() > MAX_HDMI_MODES {
            return Err(DisplayConfigError::ModeListOverflow(list.len()));
        }

        let mut infos = HdmiInfos {
            count: list.len() as i32,
            ..HdmiInfos::default()
        };
        infos.hdmi_info[..list.len()].copy_from_slice(list.as_slice());
        Ok(infos)
    }
}

impl FromIterator<HdmiInfo> for ModeList {
    fn from_iter<I: IntoIterator<Item = HdmiInfo>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a ModeList {
    type Item = &'a HdmiInfo;
    type IntoIter = std::slice::Iter<'a, HdmiInfo>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// Requested mode tuple for `set_hdmi_mode`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModeRequest {
    /// Horizontal resolution in pixels
    pub width: i32,
    /// Vertical resolution in pixels
    pub height: i32,
    /// Refresh rate in mHz
    pub refresh: i32,
    /// Interlace flag, compared verbatim against [`HdmiInfo::interlaced`]
    pub interlaced: i32,
}

impl ModeRequest {
    /// Build a request from the four meaningful `set_hdmi_mode` arguments
    pub fn new(width: i32, height: i32, refresh: i32, interlaced: i32) -> Self {
        Self {
            width,
            height,
            refresh,
            interlaced,
        }
    }
}

impl fmt::Display for ModeRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}@{}", self.width, self.height, self.refresh)?;
        if self.interlaced != 0 {
            f.write_str("i")?;
        }
        Ok(())
    }
}

/// Error parsing a `WIDTHxHEIGHT@REFRESH[i]` mode string
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid mode '{0}', expected WIDTHxHEIGHT@REFRESH_MHZ with optional trailing 'i'")]
pub struct ParseModeError(String);

impl FromStr for ModeRequest {
    type Err = ParseModeError;

    /// Parses `1920x1080@60000` or `1920x1080@60000i`
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let err = || ParseModeError(s.to_string());

        let (size, refresh) = s.trim().split_once('@').ok_or_else(err)?;
        let (width, height) = size.split_once(['x', 'X']).ok_or_else(err)?;
        let (refresh, interlaced) = match refresh.strip_suffix('i') {
            Some(refresh) => (refresh, 1),
            None => (refresh, 0),
        };

        Ok(Self {
            width: width.parse().map_err(|_| err())?,
            height: height.parse().map_err(|_| err())?,
            refresh: refresh.parse().map_err(|_| err())?,
            interlaced,
        })
    }
}
