//! Advertisement app data: node type, optional position, optional name.
//!
//! Layout: `[flags][lat:i32][lon:i32][name...]` where the low nibble of `flags` is the
//! node type and the high bits say which optional fields follow. Coordinates are
//! micro-degrees, little-endian.
use thiserror::Error;

pub const MAX_ADVERT_DATA_SIZE: usize = 32;

const LATLON_MASK: u8 = 0x10;
const BATTERY_MASK: u8 = 0x20;
const TEMPERATURE_MASK: u8 = 0x40;
const NAME_MASK: u8 = 0x80;

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    None = 0,
    Chat = 1,
    Repeater = 2,
    Room = 3,
}

impl NodeType {
    fn from_nibble(v: u8) -> Option<Self> {
        match v {
            0 => Some(NodeType::None),
            1 => Some(NodeType::Chat),
            2 => Some(NodeType::Repeater),
            3 => Some(NodeType::Room),
            _ => None,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AdvertError {
    #[error("advert app data is empty")]
    Empty,
    #[error("advert app data truncated: need {need} bytes, have {have}")]
    Truncated { need: usize, have: usize },
    #[error("unknown node type {0}")]
    UnknownType(u8),
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdvertData {
    pub node_type: NodeType,
    pub name: Option<String>,
    /// Micro-degrees.
    pub lat: i32,
    pub lon: i32,
}

impl AdvertData {
    pub fn room(name: &str, lat: f64, lon: f64) -> Self {
        Self {
            node_type: NodeType::Room,
            name: (!name.is_empty()).then(|| name.to_string()),
            lat: (lat * 1e6) as i32,
            lon: (lon * 1e6) as i32,
        }
    }

    pub fn has_lat_lon(&self) -> bool {
        !(self.lat == 0 && self.lon == 0)
    }

    pub fn latitude(&self) -> f64 {
        self.lat as f64 / 1_000_000.0
    }

    pub fn longitude(&self) -> f64 {
        self.lon as f64 / 1_000_000.0
    }

    /// Encode into at most [`MAX_ADVERT_DATA_SIZE`] bytes; long names are cut.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(MAX_ADVERT_DATA_SIZE);
        out.push(self.node_type as u8);
        if self.has_lat_lon() {
            out[0] |= LATLON_MASK;
            out.extend_from_slice(&self.lat.to_le_bytes());
            out.extend_from_slice(&self.lon.to_le_bytes());
        }
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            out[0] |= NAME_MASK;
            for &b in name.as_bytes() {
                if out.len() >= MAX_ADVERT_DATA_SIZE {
                    break;
                }
                out.push(b);
            }
        }
        out
    }

    pub fn parse(data: &[u8]) -> Result<Self, AdvertError> {
        let flags = *data.first().ok_or(AdvertError::Empty)?;
        let node_type =
            NodeType::from_nibble(flags & 0x0F).ok_or(AdvertError::UnknownType(flags & 0x0F))?;
        let mut i = 1;
        let (mut lat, mut lon) = (0i32, 0i32);
        if flags & LATLON_MASK != 0 {
            if data.len() < i + 8 {
                return Err(AdvertError::Truncated {
                    need: i + 8,
                    have: data.len(),
                });
            }
            lat = i32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
            lon = i32::from_le_bytes([data[i + 4], data[i + 5], data[i + 6], data[i + 7]]);
            i += 8;
        }
        if flags & BATTERY_MASK != 0 {
            i += 2;
        }
        if flags & TEMPERATURE_MASK != 0 {
            i += 2;
        }
        if data.len() < i {
            return Err(AdvertError::Truncated {
                need: i,
                have: data.len(),
            });
        }
        let name = if flags & NAME_MASK != 0 && data.len() > i {
            Some(String::from_utf8_lossy(&data[i..]).into_owned())
        } else {
            None
        };
        Ok(Self {
            node_type,
            name,
            lat,
            lon,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn room_advert_layout() {
        let data = AdvertData::room("Test BBS", 0.0, 0.0).encode();
        assert_eq!(data[0], NodeType::Room as u8 | NAME_MASK);
        assert_eq!(&data[1..], b"Test BBS");
    }

    #[test]
    fn position_is_micro_degrees() {
        let advert = AdvertData::room("R", -33.5, 151.25);
        let data = advert.encode();
        assert_eq!(data[0], 3 | LATLON_MASK | NAME_MASK);
        assert_eq!(&data[1..5], &(-33_500_000i32).to_le_bytes());
        assert_eq!(&data[5..9], &151_250_000i32.to_le_bytes());
        let parsed = AdvertData::parse(&data).unwrap();
        assert_eq!(parsed.latitude(), -33.5);
        assert_eq!(parsed.name.as_deref(), Some("R"));
    }

    #[test]
    fn long_names_are_cut() {
        let name = "n".repeat(64);
        let data = AdvertData::room(&name, 1.0, 1.0).encode();
        assert_eq!(data.len(), MAX_ADVERT_DATA_SIZE);
    }

    #[test]
    fn truncated_position_is_rejected() {
        let err = AdvertData::parse(&[3 | LATLON_MASK, 1, 2]).unwrap_err();
        assert_eq!(err, AdvertError::Truncated { need: 9, have: 3 });
        assert_eq!(AdvertData::parse(&[]).unwrap_err(), AdvertError::Empty);
    }
}
