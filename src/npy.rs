//! Minimal NumPy `.npy` codec for little-endian `float64` arrays.
//!
//! Layout (format version 1.0):
//!
//! - magic `\x93NUMPY`, major `1`, minor `0`
//! - `u16` little-endian header length
//! - an ASCII Python dict literal with `descr`, `fortran_order` and `shape`,
//!   space padded and `\n` terminated so the data starts on a 64-byte boundary
//! - the raw C-order element data
//!
//! The reader also accepts version 2.0/3.0 headers (`u32` length) since NumPy
//! falls back to them for very large shapes.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::Path;

use crate::{Error, Result};

const MAGIC: &[u8; 6] = b"\x93NUMPY";
const ALIGN: usize = 64;
const DESCR: &str = "<f8";

/// An n-dimensional `float64` array read from a `.npy` file.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    pub shape: Vec<usize>,
    pub data: Vec<f64>,
}

fn header_dict(shape: &[usize]) -> String {
    let dims = match shape {
        [n] => format!("({n},)"),
        _ => {
            let parts: Vec<String> = shape.iter().map(|d| d.to_string()).collect();
            format!("({})", parts.join(", "))
        }
    };
    format!("{{'descr': '{DESCR}', 'fortran_order': False, 'shape': {dims}, }}")
}

/// Encode a C-order `float64` array with the given shape.
pub fn write_f64<W: Write>(w: &mut W, shape: &[usize], data: &[f64]) -> io::Result<()> {
    let expected: usize = shape.iter().product();
    if expected != data.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!(
                "shape {shape:?} holds {expected} elements, got {}",
                data.len()
            ),
        ));
    }

    let mut header = header_dict(shape);
    // magic(6) + version(2) + len(2) + header + '\n'
    let unpadded = MAGIC.len() + 2 + 2 + header.len() + 1;
    let pad = (ALIGN - unpadded % ALIGN) % ALIGN;
    header.extend(std::iter::repeat_n(' ', pad));
    header.push('\n');

    let header_len = u16::try_from(header.len()).map_err(|_| {
        io::Error::new(io::ErrorKind::InvalidInput, "npy header too long for v1.0")
    })?;

    w.write_all(MAGIC)?;
    w.write_all(&[1, 0])?;
    w.write_all(&header_len.to_le_bytes())?;
    w.write_all(header.as_bytes())?;
    for v in data {
        w.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

/// Write a 2-D `(rows, cols)` array to `path`.
pub fn save_f64_2d<P: AsRef<Path>>(path: P, rows: usize, cols: usize, data: &[f64]) -> Result<()> {
    let p = path.as_ref();
    let file = File::create(p).map_err(|e| Error::io(p, e))?;
    let mut w = BufWriter::new(file);
    write_f64(&mut w, &[rows, cols], data).map_err(|e| Error::io(p, e))?;
    w.flush().map_err(|e| Error::io(p, e))
}

/// Decode a little-endian, C-order `float64` array.
pub fn read_f64<R: Read>(r: &mut R) -> Result<NpyArray> {
    let mut magic = [0_u8; 6];
    read_exact(r, &mut magic)?;
    if &magic != MAGIC {
        return Err(Error::InvalidData("not an npy file (bad magic)".to_owned()));
    }

    let mut version = [0_u8; 2];
    read_exact(r, &mut version)?;
    let header_len = match version[0] {
        1 => {
            let mut b = [0_u8; 2];
            read_exact(r, &mut b)?;
            u16::from_le_bytes(b) as usize
        }
        2 | 3 => {
            let mut b = [0_u8; 4];
            read_exact(r, &mut b)?;
            u32::from_le_bytes(b) as usize
        }
        v => {
            return Err(Error::InvalidData(format!(
                "unsupported npy format version {v}.{}",
                version[1]
            )));
        }
    };

    let mut header = vec![0_u8; header_len];
    read_exact(r, &mut header)?;
    let header = String::from_utf8(header)
        .map_err(|_| Error::InvalidData("npy header is not valid text".to_owned()))?;

    let descr = dict_value(&header, "descr")?;
    if descr.trim_matches(['\'', '"']) != DESCR {
        return Err(Error::InvalidData(format!(
            "unsupported npy dtype {descr}, expected '{DESCR}'"
        )));
    }
    if dict_value(&header, "fortran_order")? != "False" {
        return Err(Error::InvalidData(
            "fortran-ordered npy arrays are not supported".to_owned(),
        ));
    }
    let shape = parse_shape(dict_value(&header, "shape")?)?;

    let len: usize = shape.iter().product();
    let mut raw = vec![0_u8; len * 8];
    read_exact(r, &mut raw)?;
    let data = raw
        .chunks_exact(8)
        .map(|c| {
            let mut b = [0_u8; 8];
            b.copy_from_slice(c);
            f64::from_le_bytes(b)
        })
        .collect();

    Ok(NpyArray { shape, data })
}

/// Read an `.npy` file from disk.
pub fn load_f64<P: AsRef<Path>>(path: P) -> Result<NpyArray> {
    let p = path.as_ref();
    let file = File::open(p).map_err(|e| Error::io(p, e))?;
    read_f64(&mut BufReader::new(file))
}

fn read_exact<R: Read>(r: &mut R, buf: &mut [u8]) -> Result<()> {
    r.read_exact(buf)
        .map_err(|e| Error::InvalidData(format!("truncated npy data: {e}")))
}

/// Raw text of `key`'s value in the header dict (up to the next top-level comma).
fn dict_value<'a>(header: &'a str, key: &str) -> Result<&'a str> {
    let missing = || Error::InvalidData(format!("npy header has no '{key}' entry"));

    let start = header
        .find(&format!("'{key}'"))
        .or_else(|| header.find(&format!("\"{key}\"")))
        .ok_or_else(missing)?;
    let rest = &header[start + key.len() + 2..];
    let rest = rest.trim_start().strip_prefix(':').ok_or_else(missing)?.trim_start();

    let end = if rest.starts_with('(') {
        rest.find(')').map(|i| i + 1)
    } else {
        rest.find([',', '}'])
    }
    .ok_or_else(missing)?;
    Ok(rest[..end].trim())
}

fn parse_shape(s: &str) -> Result<Vec<usize>> {
    let inner = s
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| Error::InvalidData(format!("malformed npy shape {s}")))?;
    inner
        .split(',')
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| {
            d.parse::<usize>()
                .map_err(|_| Error::InvalidData(format!("malformed npy dimension {d:?}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_is_aligned_and_newline_terminated() {
        let mut buf = Vec::new();
        write_f64(&mut buf, &[2, 3], &[0.0; 6]).unwrap();

        let header_len = u16::from_le_bytes([buf[8], buf[9]]) as usize;
        assert_eq!((10 + header_len) % ALIGN, 0);
        assert_eq!(buf[10 + header_len - 1], b'\n');
        assert_eq!(buf.len(), 10 + header_len + 6 * 8);

        let header = std::str::from_utf8(&buf[10..10 + header_len]).unwrap();
        assert!(header.starts_with("{'descr': '<f8', 'fortran_order': False, 'shape': (2, 3), }"));
    }

    #[test]
    fn reads_back_what_it_writes() {
        let data = [1.5, -2.0, 0.25, 3.0];
        let mut buf = Vec::new();
        write_f64(&mut buf, &[4], &data).unwrap();
        let arr = read_f64(&mut buf.as_slice()).unwrap();
        assert_eq!(arr.shape, vec![4]);
        assert_eq!(arr.data, data);
    }

    #[test]
    fn rejects_shape_data_mismatch_and_bad_magic() {
        let mut buf = Vec::new();
        assert!(write_f64(&mut buf, &[2, 2], &[0.0; 3]).is_err());
        assert!(read_f64(&mut &b"NOTNPY\x01\x00"[..]).is_err());
    }

    #[test]
    fn rejects_other_dtypes() {
        let header = "{'descr': '<f4', 'fortran_order': False, 'shape': (1,), }\n";
        let mut buf = Vec::new();
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&[1, 0]);
        buf.extend_from_slice(&(header.len() as u16).to_le_bytes());
        buf.extend_from_slice(header.as_bytes());
        buf.extend_from_slice(&1.0_f32.to_le_bytes());
        let err = read_f64(&mut buf.as_slice()).unwrap_err();
        assert!(err.to_string().contains("dtype"));
    }
}
