//! Torrent metainfo reader.
//!
//! Decodes just enough bencode to extract the payload layout: the top-level
//! name and the list of contained files.

use std::collections::BTreeMap;

use crate::{Error, Result};

const MAX_DEPTH: usize = 64;

/// A decoded bencode value.
#[derive(Debug, Clone, PartialEq)]
pub enum Bencode {
    Int(i64),
    Bytes(Vec<u8>),
    List(Vec<Bencode>),
    Dict(BTreeMap<Vec<u8>, Bencode>),
}

impl Bencode {
    pub fn get(&self, key: &str) -> Option<&Bencode> {
        match self {
            Self::Dict(map) => map.get(key.as_bytes()),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Bytes(bytes) => std::str::from_utf8(bytes).ok(),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Bencode]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

/// Decode a complete bencode document.
pub fn decode(data: &[u8]) -> Result<Bencode> {
    let mut parser = Parser { data, pos: 0 };
    let value = parser.value(0)?;
    if parser.pos != data.len() {
        return Err(parser.error("trailing data after document"));
    }
    Ok(value)
}

struct Parser<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn error(&self, reason: &str) -> Error {
        Error::AcquisitionFailed(format!("invalid torrent at byte {}: {reason}", self.pos))
    }

    fn peek(&self) -> Result<u8> {
        self.data
            .get(self.pos)
            .copied()
            .ok_or_else(|| self.error("unexpected end of data"))
    }

    fn value(&mut self, depth: usize) -> Result<Bencode> {
        if depth > MAX_DEPTH {
            return Err(self.error("nesting too deep"));
        }
        match self.peek()? {
            b'i' => {
                self.pos += 1;
                let digits = self.until(b'e')?;
                let text = std::str::from_utf8(digits).map_err(|_| self.error("bad integer"))?;
                let value = text.parse::<i64>().map_err(|_| self.error("bad integer"))?;
                Ok(Bencode::Int(value))
            }
            b'l' => {
                self.pos += 1;
                let mut items = Vec::new();
                while self.peek()? != b'e' {
                    items.push(self.value(depth + 1)?);
                }
                self.pos += 1;
                Ok(Bencode::List(items))
            }
            b'd' => {
                self.pos += 1;
                let mut map = BTreeMap::new();
                while self.peek()? != b'e' {
                    let key = self.bytes()?;
                    let value = self.value(depth + 1)?;
                    map.insert(key, value);
                }
                self.pos += 1;
                Ok(Bencode::Dict(map))
            }
            b'0'..=b'9' => self.bytes().map(Bencode::Bytes),
            _ => Err(self.error("unexpected token")),
        }
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        let len_digits = self.until(b':')?;
        let len = std::str::from_utf8(len_digits)
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or_else(|| self.error("bad string length"))?;
        let end = self
            .pos
            .checked_add(len)
            .filter(|end| *end <= self.data.len())
            .ok_or_else(|| self.error("string runs past end of data"))?;
        let bytes = self.data[self.pos..end].to_vec();
        self.pos = end;
        Ok(bytes)
    }

    fn until(&mut self, delimiter: u8) -> Result<&'a [u8]> {
        let data = self.data;
        let start = self.pos;
        let offset = data[start..]
            .iter()
            .position(|b| *b == delimiter)
            .ok_or_else(|| self.error("missing delimiter"))?;
        self.pos = start + offset + 1;
        Ok(&data[start..start + offset])
    }
}

/// Layout of a torrent's payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TorrentLayout {
    pub name: String,
    /// Top-level folder for multi-file torrents.
    pub folder: Option<String>,
    /// File paths relative to the folder; the single file name otherwise.
    pub files: Vec<String>,
    pub total_size: u64,
}

/// Read the payload layout from raw `.torrent` bytes.
pub fn read_layout(data: &[u8]) -> Result<TorrentLayout> {
    let root = decode(data)?;
    let info = root
        .get("info")
        .ok_or_else(|| Error::AcquisitionFailed("torrent has no info dictionary".into()))?;
    let name = info
        .get("name.utf-8")
        .or_else(|| info.get("name"))
        .and_then(Bencode::as_str)
        .unwrap_or_default()
        .to_string();

    if let Some(files) = info.get("files").and_then(Bencode::as_list) {
        let mut paths = Vec::with_capacity(files.len());
        let mut total = 0u64;
        for file in files {
            let length = file
                .get("length")
                .and_then(Bencode::as_int)
                .and_then(|len| u64::try_from(len).ok())
                .unwrap_or(0);
            total = total.saturating_add(length);
            let components = file
                .get("path.utf-8")
                .or_else(|| file.get("path"))
                .and_then(Bencode::as_list)
                .unwrap_or_default();
            let path: Vec<&str> = components.iter().filter_map(Bencode::as_str).collect();
            if !path.is_empty() {
                paths.push(path.join("/"));
            }
        }
        return Ok(TorrentLayout {
            folder: Some(name.clone()).filter(|n| !n.is_empty()),
            name,
            files: paths,
            total_size: total,
        });
    }

    let length = info
        .get("length")
        .and_then(Bencode::as_int)
        .and_then(|len| u64::try_from(len).ok())
        .unwrap_or(0);
    Ok(TorrentLayout {
        folder: None,
        files: if name.is_empty() { Vec::new() } else { vec![name.clone()] },
        name,
        total_size: length,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_file() -> Vec<u8> {
        b"d8:announce13:http://t/ann/4:infod6:lengthi1024e4:name9:movie.mkv12:piece lengthi16384e6:pieces0:ee".to_vec()
    }

    fn multi_file() -> Vec<u8> {
        b"d4:infod5:filesld6:lengthi10e4:pathl5:a.mkveed6:lengthi5e4:pathl4:subs5:a.srteee4:name7:Show.S112:piece lengthi16384e6:pieces0:ee".to_vec()
    }

    #[test]
    fn test_single_file_layout() {
        let layout = read_layout(&single_file()).unwrap();
        assert_eq!(layout.name, "movie.mkv");
        assert_eq!(layout.folder, None);
        assert_eq!(layout.files, vec!["movie.mkv"]);
        assert_eq!(layout.total_size, 1024);
    }

    #[test]
    fn test_multi_file_layout() {
        let layout = read_layout(&multi_file()).unwrap();
        assert_eq!(layout.folder.as_deref(), Some("Show.S1"));
        assert_eq!(layout.files, vec!["a.mkv", "subs/a.srt"]);
        assert_eq!(layout.total_size, 15);
    }

    #[test]
    fn test_total_size_saturates() {
        let huge = i64::MAX;
        let data = format!(
            "d4:infod5:filesld6:lengthi{huge}e4:pathl1:aeed6:lengthi{huge}e4:pathl1:beed6:lengthi{huge}e4:pathl1:ceee4:name1:xee"
        );
        let layout = read_layout(data.as_bytes()).unwrap();
        assert_eq!(layout.files, vec!["a", "b", "c"]);
        assert_eq!(layout.total_size, u64::MAX);
    }

    #[test]
    fn test_rejects_garbage() {
        assert!(read_layout(b"<html>login required</html>").is_err());
        assert!(read_layout(b"d4:infod").is_err());
        assert!(read_layout(b"d4:spam99999:x").is_err());
    }

    #[test]
    fn test_missing_info() {
        let err = read_layout(b"d3:foo3:bare").unwrap_err();
        assert!(err.to_string().contains("info"));
    }
}
