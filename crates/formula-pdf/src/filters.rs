//! Stream filter decoding.
//!
//! Only what the index layer needs is supported: `FlateDecode` with optional PNG/TIFF predictors
//! (the encoding used by virtually every cross-reference and object stream). Every decoder is
//! bounded by a caller-provided output cap so a small compressed stream cannot expand without
//! limit.

use std::io::Read;

use flate2::read::ZlibDecoder;

use crate::error::{Error, Result};
use crate::object::{Dictionary, Object};

/// Decode `data` according to the `/Filter` and `/DecodeParms` entries of `dict`.
pub(crate) fn decode_stream(dict: &Dictionary, data: &[u8], limit: usize) -> Result<Vec<u8>> {
    let filters: Vec<&[u8]> = match dict.get("Filter") {
        None | Some(Object::Null) => Vec::new(),
        Some(Object::Name(name)) => vec![name.as_bytes()],
        Some(Object::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_name().map(|name| name.as_bytes()))
            .collect(),
        Some(other) => {
            return Err(Error::UnsupportedFilter(format!(
                "/Filter of type {}",
                other.type_name()
            )))
        }
    };

    let parms: Vec<Option<&Dictionary>> = match dict.get("DecodeParms").or_else(|| dict.get("DP"))
    {
        Some(Object::Dictionary(parms)) => vec![Some(parms)],
        Some(Object::Array(items)) => items.iter().map(Object::as_dict).collect(),
        _ => Vec::new(),
    };

    if filters.is_empty() {
        if data.len() > limit {
            return Err(Error::LimitExceeded {
                what: "stream length",
                limit: limit as u64,
            });
        }
        return Ok(data.to_vec());
    }

    let mut current = data.to_vec();
    for (idx, filter) in filters.iter().enumerate() {
        let parms = parms.get(idx).copied().flatten();
        current = match *filter {
            b"FlateDecode" | b"Fl" => {
                let inflated = inflate(&current, limit)?;
                apply_predictor(inflated, parms)?
            }
            other => {
                return Err(Error::UnsupportedFilter(
                    String::from_utf8_lossy(other).into_owned(),
                ))
            }
        };
    }
    Ok(current)
}

/// Inflate a zlib stream, keeping whatever was produced before a corrupt or truncated tail.
pub(crate) fn inflate(data: &[u8], limit: usize) -> Result<Vec<u8>> {
    let cap = u64::try_from(limit)
        .ok()
        .and_then(|v| v.checked_add(1))
        .ok_or(Error::Overflow {
            context: "inflate output cap",
        })?;
    let mut out = Vec::new();
    let mut decoder = ZlibDecoder::new(data).take(cap);
    if let Err(err) = decoder.read_to_end(&mut out) {
        if out.is_empty() {
            return Err(Error::Decompress(err.to_string()));
        }
        log::debug!(
            "keeping {} bytes inflated before a damaged zlib tail: {err}",
            out.len()
        );
    }
    if out.len() > limit {
        return Err(Error::LimitExceeded {
            what: "decoded stream length",
            limit: limit as u64,
        });
    }
    Ok(out)
}

fn parm_usize(parms: &Dictionary, key: &str, default: usize) -> Result<usize> {
    match parms.get_int(key) {
        None => Ok(default),
        Some(v) => usize::try_from(v)
            .ok()
            .filter(|v| *v > 0)
            .ok_or_else(|| Error::damaged(0, format!("invalid /{key} {v} in /DecodeParms"))),
    }
}

fn apply_predictor(data: Vec<u8>, parms: Option<&Dictionary>) -> Result<Vec<u8>> {
    let Some(parms) = parms else {
        return Ok(data);
    };
    let predictor = parms.get_int("Predictor").unwrap_or(1);
    if predictor <= 1 {
        return Ok(data);
    }

    let colors = parm_usize(parms, "Colors", 1)?;
    let bits = parm_usize(parms, "BitsPerComponent", 8)?;
    let columns = parm_usize(parms, "Columns", 1)?;

    let bits_per_pixel = colors.checked_mul(bits).ok_or(Error::Overflow {
        context: "predictor pixel width",
    })?;
    let bytes_per_pixel = bits_per_pixel.div_ceil(8).max(1);
    let row_len = bits_per_pixel
        .checked_mul(columns)
        .ok_or(Error::Overflow {
            context: "predictor row width",
        })?
        .div_ceil(8);

    match predictor {
        2 => tiff_predictor(data, bits, bytes_per_pixel, row_len),
        10..=15 => png_predictor(&data, bytes_per_pixel, row_len),
        other => Err(Error::UnsupportedFilter(format!("predictor {other}"))),
    }
}

fn tiff_predictor(
    mut data: Vec<u8>,
    bits: usize,
    bytes_per_pixel: usize,
    row_len: usize,
) -> Result<Vec<u8>> {
    if bits != 8 {
        return Err(Error::UnsupportedFilter(format!(
            "TIFF predictor with {bits} bits per component"
        )));
    }
    if row_len == 0 {
        return Ok(data);
    }
    for row in data.chunks_mut(row_len) {
        for i in bytes_per_pixel..row.len() {
            row[i] = row[i].wrapping_add(row[i - bytes_per_pixel]);
        }
    }
    Ok(data)
}

fn paeth(left: u8, up: u8, up_left: u8) -> u8 {
    let p = i16::from(left) + i16::from(up) - i16::from(up_left);
    let pa = (p - i16::from(left)).abs();
    let pb = (p - i16::from(up)).abs();
    let pc = (p - i16::from(up_left)).abs();
    if pa <= pb && pa <= pc {
        left
    } else if pb <= pc {
        up
    } else {
        up_left
    }
}

fn png_predictor(data: &[u8], bytes_per_pixel: usize, row_len: usize) -> Result<Vec<u8>> {
    let stride = row_len.checked_add(1).ok_or(Error::Overflow {
        context: "predictor stride",
    })?;
    if stride > data.len() {
        return Ok(Vec::new());
    }
    let mut out = Vec::with_capacity(data.len() / stride * row_len);
    let mut prev = vec![0u8; row_len];
    let mut row = vec![0u8; row_len];

    // A trailing partial row is dropped; it cannot hold a complete record anyway.
    for chunk in data.chunks_exact(stride) {
        let filter = chunk[0];
        row.copy_from_slice(&chunk[1..]);
        for i in 0..row_len {
            let left = if i >= bytes_per_pixel {
                row[i - bytes_per_pixel]
            } else {
                0
            };
            let up = prev[i];
            let up_left = if i >= bytes_per_pixel {
                prev[i - bytes_per_pixel]
            } else {
                0
            };
            row[i] = match filter {
                0 => row[i],
                1 => row[i].wrapping_add(left),
                2 => row[i].wrapping_add(up),
                3 => row[i].wrapping_add(((u16::from(left) + u16::from(up)) / 2) as u8),
                4 => row[i].wrapping_add(paeth(left, up, up_left)),
                other => {
                    return Err(Error::damaged(0, format!("unknown PNG row filter {other}")))
                }
            };
        }
        out.extend_from_slice(&row);
        std::mem::swap(&mut prev, &mut row);
    }
    Ok(out)
}
