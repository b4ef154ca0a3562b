//! Minimal IPTC-IIM tag support for JPEG and TIFF.
//!
//! Reading pulls IPTC Record 2 datasets into the pipeline's tag set under
//! exiv2-style keys (`Iptc.Application2.ObjectName` and friends).
//!
//! For JPEG: reads from the APP13 marker (Photoshop 8BIM resource 0x0404).
//! For TIFF: reads from IFD tag 33723 (IPTC-NAA, raw IIM bytes), falling
//! back to tag 34377 (Photoshop image resources).
//!
//! Writing goes the other way for JPEG only: [`app13_segment`] wraps the
//! writable tags in a complete APP13 segment the encoder splices in after
//! the SOI marker.
//!
//! Parse failures of any kind yield an empty tag set; embedded metadata is
//! never a reason to fail a decode.

use crate::image::TagSet;
use std::path::Path;

/// Read IPTC tags from a file, dispatching by extension. Formats without
/// an IPTC carrier yield an empty set.
pub fn read_tags(path: &Path) -> TagSet {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let bytes = match std::fs::read(path) {
        Ok(b) => b,
        Err(_) => return TagSet::new(),
    };

    match ext.as_str() {
        "jpg" | "jpeg" => tags_from_jpeg(&bytes),
        "tif" | "tiff" => tags_from_tiff(&bytes),
        _ => TagSet::new(),
    }
}

pub(crate) fn tags_from_jpeg(data: &[u8]) -> TagSet {
    match find_jpeg_app13_iptc(data) {
        Some(iim) => parse_iptc_iim(iim),
        None => TagSet::new(),
    }
}

/// Record 2 dataset numbers worth carrying, with their tag keys.
const DATASET_KEYS: &[(u8, &str)] = &[
    (5, "Iptc.Application2.ObjectName"),
    (25, "Iptc.Application2.Keywords"),
    (80, "Iptc.Application2.Byline"),
    (116, "Iptc.Application2.Copyright"),
    (120, "Iptc.Application2.Caption"),
];

/// Parse raw IPTC-IIM bytes into tags.
///
/// IIM dataset layout:
///   Byte 0:    0x1C (tag marker)
///   Byte 1:    Record number (we want 0x02)
///   Byte 2:    Dataset number
///   Bytes 3-4: Data length (big-endian u16)
///   Bytes 5+:  Data (UTF-8/ASCII string)
///
/// Repeatable datasets (keywords) are joined with `"; "`.
pub(crate) fn parse_iptc_iim(data: &[u8]) -> TagSet {
    let mut tags = TagSet::new();
    let mut pos = 0;

    while pos + 5 <= data.len() {
        if data[pos] != 0x1C {
            pos += 1;
            continue;
        }

        let record = data[pos + 1];
        let dataset = data[pos + 2];
        let length = u16::from_be_bytes([data[pos + 3], data[pos + 4]]) as usize;
        pos += 5;

        if pos + length > data.len() {
            break;
        }

        if record == 2 {
            let value = String::from_utf8_lossy(&data[pos..pos + length]).trim().to_string();
            if !value.is_empty() {
                if let Some((_, key)) = DATASET_KEYS.iter().find(|(d, _)| *d == dataset) {
                    tags.entry(key.to_string())
                        .and_modify(|existing| {
                            existing.push_str("; ");
                            existing.push_str(&value);
                        })
                        .or_insert(value);
                }
            }
        }

        pos += length;
    }

    tags
}

/// Serialize the writable tags back into raw IPTC-IIM bytes, the inverse
/// of [`parse_iptc_iim`]. Keys outside the dataset table are skipped;
/// joined keywords are split back into repeated datasets.
pub(crate) fn build_iptc_iim(tags: &TagSet) -> Vec<u8> {
    let mut out = Vec::new();
    for (dataset, key) in DATASET_KEYS {
        let Some(value) = tags.get(*key) else { continue };
        let values: Vec<&str> = if *key == "Iptc.Application2.Keywords" {
            value.split("; ").collect()
        } else {
            vec![value.as_str()]
        };
        for v in values {
            let bytes = v.as_bytes();
            if bytes.is_empty() || bytes.len() > u16::MAX as usize {
                continue;
            }
            out.extend_from_slice(&[0x1C, 0x02, *dataset]);
            out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
            out.extend_from_slice(bytes);
        }
    }
    out
}

/// Build a complete JPEG APP13 segment (marker and length included)
/// carrying the writable tags as a Photoshop 8BIM resource 0x0404.
/// `None` when the tags hold nothing writable or the block would exceed
/// the segment size limit.
pub(crate) fn app13_segment(tags: &TagSet) -> Option<Vec<u8>> {
    let iim = build_iptc_iim(tags);
    if iim.is_empty() {
        return None;
    }

    let mut payload = Vec::new();
    payload.extend_from_slice(PHOTOSHOP_HEADER);
    payload.extend_from_slice(BIM_MARKER);
    payload.extend_from_slice(&IPTC_RESOURCE_ID.to_be_bytes());
    payload.extend_from_slice(&[0x00, 0x00]); // empty pascal name, padded
    payload.extend_from_slice(&(iim.len() as u32).to_be_bytes());
    payload.extend_from_slice(&iim);
    if iim.len() % 2 == 1 {
        payload.push(0x00);
    }

    // The u16 segment length counts itself.
    if payload.len() + 2 > u16::MAX as usize {
        return None;
    }
    let mut segment = vec![0xFF, 0xED];
    segment.extend_from_slice(&((payload.len() + 2) as u16).to_be_bytes());
    segment.extend_from_slice(&payload);
    Some(segment)
}

const PHOTOSHOP_HEADER: &[u8] = b"Photoshop 3.0\0";
const BIM_MARKER: &[u8] = b"8BIM";
const IPTC_RESOURCE_ID: u16 = 0x0404;

/// Find the raw IPTC-IIM bytes inside a JPEG's APP13 segment.
fn find_jpeg_app13_iptc(data: &[u8]) -> Option<&[u8]> {
    let mut pos = 0;
    while pos + 4 < data.len() {
        if data[pos] == 0xFF && data[pos + 1] == 0xED {
            let seg_len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
            let seg_start = pos + 4;
            let seg_end = (pos + 2 + seg_len).min(data.len());
            if let Some(iptc) = extract_iptc_from_8bim(&data[seg_start..seg_end]) {
                return Some(iptc);
            }
        }

        // Advance marker by marker until the entropy-coded data starts.
        if data[pos] == 0xFF && pos + 3 < data.len() && data[pos + 1] != 0x00 {
            let marker = data[pos + 1];
            if marker == 0xDA {
                break;
            }
            if marker == 0xD8 || marker == 0xD9 || (0xD0..=0xD7).contains(&marker) {
                pos += 2;
            } else {
                let len = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
                pos += 2 + len;
            }
        } else {
            pos += 1;
        }
    }
    None
}

/// Extract IPTC-IIM bytes from a Photoshop 8BIM resource block.
fn extract_iptc_from_8bim(segment: &[u8]) -> Option<&[u8]> {
    let data = if segment.starts_with(PHOTOSHOP_HEADER) {
        &segment[PHOTOSHOP_HEADER.len()..]
    } else {
        segment
    };

    let mut pos = 0;
    while pos + 12 <= data.len() {
        // Each resource: "8BIM" + resource id + pascal string + length + data.
        if &data[pos..pos + 4] != BIM_MARKER {
            pos += 1;
            continue;
        }
        pos += 4;

        if pos + 2 > data.len() {
            break;
        }
        let resource_id = u16::from_be_bytes([data[pos], data[pos + 1]]);
        pos += 2;

        // Pascal string: length byte + string, padded to an even total.
        if pos >= data.len() {
            break;
        }
        let pascal_len = data[pos] as usize;
        pos += 1 + pascal_len + ((1 + pascal_len) % 2);

        if pos + 4 > data.len() {
            break;
        }
        let res_len =
            u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        pos += 4;

        if pos + res_len > data.len() {
            break;
        }
        if resource_id == IPTC_RESOURCE_ID {
            return Some(&data[pos..pos + res_len]);
        }
        pos += res_len + (res_len % 2);
    }

    None
}

/// Read IPTC-IIM tags from a TIFF byte stream.
fn tags_from_tiff(data: &[u8]) -> TagSet {
    if data.len() < 8 {
        return TagSet::new();
    }

    let big_endian = match &data[0..2] {
        b"MM" => true,
        b"II" => false,
        _ => return TagSet::new(),
    };

    let read_u16 = |offset: usize| -> u16 {
        let b = [data[offset], data[offset + 1]];
        if big_endian { u16::from_be_bytes(b) } else { u16::from_le_bytes(b) }
    };
    let read_u32 = |offset: usize| -> u32 {
        let b = [data[offset], data[offset + 1], data[offset + 2], data[offset + 3]];
        if big_endian { u32::from_be_bytes(b) } else { u32::from_le_bytes(b) }
    };

    if read_u16(2) != 42 {
        return TagSet::new();
    }

    // Entry counts are value counts; bytes = count * type size.
    let type_size = |typ: u16| -> usize {
        match typ {
            1 | 2 | 6 | 7 => 1,
            3 | 8 => 2,
            4 | 9 | 11 => 4,
            5 | 10 | 12 => 8,
            _ => 1,
        }
    };

    let mut ifd_offset = read_u32(4) as usize;
    while ifd_offset > 0 && ifd_offset + 2 < data.len() {
        let entry_count = read_u16(ifd_offset) as usize;
        let entries_start = ifd_offset + 2;

        for i in 0..entry_count {
            let entry_offset = entries_start + i * 12;
            if entry_offset + 12 > data.len() {
                return TagSet::new();
            }

            let tag = read_u16(entry_offset);
            let typ = read_u16(entry_offset + 2);
            let count = read_u32(entry_offset + 4) as usize;
            let byte_len = count * type_size(typ);

            // Payloads of at most four bytes live inline in the offset
            // field rather than behind it.
            let value_start = if byte_len <= 4 {
                entry_offset + 8
            } else {
                read_u32(entry_offset + 8) as usize
            };

            // Tag 33723: IPTC-NAA, raw IIM bytes.
            if tag == 33723 && value_start + byte_len <= data.len() {
                let tags = parse_iptc_iim(&data[value_start..value_start + byte_len]);
                if !tags.is_empty() {
                    return tags;
                }
            }

            // Tag 34377: Photoshop image resources, 8BIM blocks.
            if tag == 34377 && value_start + byte_len <= data.len() {
                if let Some(iim) =
                    extract_iptc_from_8bim(&data[value_start..value_start + byte_len])
                {
                    let tags = parse_iptc_iim(iim);
                    if !tags.is_empty() {
                        return tags;
                    }
                }
            }
        }

        let next_offset_pos = entries_start + entry_count * 12;
        if next_offset_pos + 4 <= data.len() {
            ifd_offset = read_u32(next_offset_pos) as usize;
        } else {
            break;
        }
    }

    TagSet::new()
}
