//! Lossless JPEG optimization by marker surgery.
//!
//! Walks the marker segments before the first scan and drops the ones that
//! carry only metadata: APP1 and APP3–APP15 (EXIF, XMP, IPTC, ...) and COM.
//! APP0 (JFIF), APP2 (ICC profile) and APP14 (Adobe colour transform) stay
//! because they change how the scan data is turned into colours. Everything
//! from SOS onwards is copied verbatim, so pixels are bit-identical.
//!
//! Anything that does not parse as a JPEG is returned unchanged.

const SOI: u8 = 0xD8;
const EOI: u8 = 0xD9;
const SOS: u8 = 0xDA;
const APP0: u8 = 0xE0;
const APP2: u8 = 0xE2;
const APP14: u8 = 0xEE;
const APP15: u8 = 0xEF;
const COM: u8 = 0xFE;
const TEM: u8 = 0x01;

pub fn is_jpeg(data: &[u8]) -> bool {
    data.len() >= 3 && data[0] == 0xFF && data[1] == SOI && data[2] == 0xFF
}

/// Strip metadata segments from `data`. Returns the input untouched when it
/// is not a JPEG or its header is malformed.
pub fn strip_metadata(data: Vec<u8>) -> Vec<u8> {
    if !is_jpeg(&data) {
        return data;
    }
    match rebuild(&data) {
        Some(stripped) => stripped,
        None => data,
    }
}

fn is_metadata(marker: u8) -> bool {
    marker == COM
        || (((APP0 + 1)..=APP15).contains(&marker) && marker != APP2 && marker != APP14)
}

fn rebuild(data: &[u8]) -> Option<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len());
    out.extend_from_slice(&data[..2]);
    let mut pos = 2;

    loop {
        if data.get(pos) != Some(&0xFF) {
            return None;
        }
        // Fill bytes before a marker
        while data.get(pos + 1) == Some(&0xFF) {
            pos += 1;
        }
        let marker = *data.get(pos + 1)?;

        match marker {
            SOS => {
                out.extend_from_slice(&data[pos..]);
                return Some(out);
            }
            EOI => {
                out.extend_from_slice(&data[pos..pos + 2]);
                return Some(out);
            }
            TEM | 0xD0..=0xD7 => {
                out.extend_from_slice(&data[pos..pos + 2]);
                pos += 2;
            }
            _ => {
                let len = u16::from_be_bytes([*data.get(pos + 2)?, *data.get(pos + 3)?]) as usize;
                if len < 2 {
                    return None;
                }
                let end = pos + 2 + len;
                if end > data.len() {
                    return None;
                }
                if !is_metadata(marker) {
                    out.extend_from_slice(&data[pos..end]);
                }
                pos = end;
            }
        }
    }
}
