//! Layer `<data>` decoding: plain `<tile>` lists, CSV, and base64 with
//! optional zlib or gzip compression.

use crate::error::MapError;
use crate::loader::xml::XmlNode;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::bufread::GzDecoder;
use flate2::{Decompress, FlushDecompress, Status};
use std::io::Read;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Zlib,
    Gzip,
}

/// Decodes a layer's `<data>` node into raw GIDs (flip flags included) and
/// checks that it holds exactly `expected` cells.
pub fn decode_layer_data(data: &XmlNode, layer: &str, expected: usize) -> Result<Vec<u32>, MapError> {
    let gids = match data.attr("encoding") {
        None => decode_plain(data),
        Some("csv") => decode_csv(&data.text)?,
        Some("base64") => {
            let bytes = decode_base64(&data.text)?;
            let bytes = match data.attr("compression") {
                None | Some("") => bytes,
                Some("zlib") => inflate(&bytes, expected * 4, Compression::Zlib)?,
                Some("gzip") => inflate(&bytes, expected * 4, Compression::Gzip)?,
                Some(other) => {
                    return Err(MapError::UnsupportedCompression {
                        layer: layer.to_owned(),
                        compression: other.to_owned(),
                    });
                }
            };
            gids_from_bytes(&bytes)?
        }
        Some(other) => {
            return Err(MapError::UnsupportedEncoding {
                layer: layer.to_owned(),
                encoding: other.to_owned(),
            });
        }
    };

    if gids.len() != expected {
        return Err(MapError::InvalidLayerSize {
            layer: layer.to_owned(),
            expected,
            found: gids.len(),
        });
    }
    Ok(gids)
}

/// One `<tile gid=".."/>` child per cell; a missing gid is an empty cell.
pub fn decode_plain(data: &XmlNode) -> Vec<u32> {
    data.children_named("tile")
        .map(|t| t.attr_or("gid", 0u32))
        .collect()
}

pub fn decode_csv(text: &str) -> Result<Vec<u32>, MapError> {
    text.split(',')
        .map(str::trim)
        .filter(|tok| !tok.is_empty())
        .map(|tok| {
            tok.parse::<u32>()
                .map_err(|_| MapError::InvalidMap(format!("invalid CSV tile value '{tok}'")))
        })
        .collect()
}

/// Standard-alphabet base64 with all whitespace ignored.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, MapError> {
    let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    Ok(STANDARD.decode(cleaned)?)
}

/// Little-endian 32-bit words.
pub fn gids_from_bytes(bytes: &[u8]) -> Result<Vec<u32>, MapError> {
    if bytes.len() % 4 != 0 {
        return Err(MapError::InvalidMap(format!(
            "layer data is {} bytes, not a whole number of tiles",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(4)
        .map(|w| u32::from_le_bytes([w[0], w[1], w[2], w[3]]))
        .collect())
}

/// Inflates a whole zlib or gzip stream.
///
/// The output starts with `expected_size` bytes of capacity and doubles
/// whenever it fills before the stream ends, carrying only the bytes
/// written so far. A zlib stream resumes from the same decompressor state
/// after each growth; gzip framing (member header, CRC32 and size trailer)
/// is handled by flate2's `GzDecoder`, which reads into the same growing
/// buffer.
pub fn inflate(input: &[u8], expected_size: usize, format: Compression) -> Result<Vec<u8>, MapError> {
    match format {
        Compression::Zlib => inflate_zlib(input, expected_size),
        Compression::Gzip => inflate_gzip(input, expected_size),
    }
}

fn inflate_zlib(input: &[u8], expected_size: usize) -> Result<Vec<u8>, MapError> {
    let mut stream = Decompress::new(true);
    let mut out = Vec::with_capacity(expected_size.max(1));
    loop {
        if out.len() == out.capacity() {
            let grow = out.capacity();
            out.reserve_exact(grow);
        }
        let consumed = stream.total_in() as usize;
        let written = out.len();
        let status = stream
            .decompress_vec(&input[consumed..], &mut out, FlushDecompress::None)
            .map_err(|e| MapError::Decompress(e.to_string()))?;

        match status {
            Status::StreamEnd => break,
            Status::Ok | Status::BufError => {
                let stalled = stream.total_in() as usize == consumed && out.len() == written;
                if stalled && out.len() < out.capacity() {
                    return Err(MapError::Decompress("compressed stream is truncated".into()));
                }
            }
        }
    }

    let rest = input.len() - stream.total_in() as usize;
    if rest != 0 {
        return Err(MapError::Decompress(format!("{rest} trailing bytes after zlib stream")));
    }
    Ok(out)
}

fn inflate_gzip(input: &[u8], expected_size: usize) -> Result<Vec<u8>, MapError> {
    let mut decoder = GzDecoder::new(input);
    let mut out = Vec::with_capacity(expected_size.max(1));
    decoder
        .read_to_end(&mut out)
        .map_err(|e| MapError::Decompress(e.to_string()))?;

    let rest = decoder.into_inner().len();
    if rest != 0 {
        return Err(MapError::Decompress(format!("{rest} trailing bytes after gzip stream")));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::{GzEncoder, ZlibEncoder};
    use std::io::Write;

    fn words(gids: &[u32]) -> Vec<u8> {
        gids.iter().flat_map(|g| g.to_le_bytes()).collect()
    }

    fn zlib(bytes: &[u8]) -> Vec<u8> {
        let mut enc = ZlibEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(bytes).expect("write");
        enc.finish().expect("finish")
    }

    fn gzip(bytes: &[u8]) -> Vec<u8> {
        let mut enc = GzEncoder::new(Vec::new(), flate2::Compression::default());
        enc.write_all(bytes).expect("write");
        enc.finish().expect("finish")
    }

    fn data_node(xml: &str) -> XmlNode {
        XmlNode::parse(xml).expect("xml")
    }

    #[test]
    fn csv_ignores_whitespace_and_trailing_comma() {
        assert_eq!(decode_csv(" 1, 2,\n3 ,4,\n").expect("csv"), vec![1, 2, 3, 4]);
        assert!(matches!(decode_csv("1,x,3"), Err(MapError::InvalidMap(_))));
    }

    #[test]
    fn csv_keeps_flip_flags() {
        let raw = 0x8000_0001u32;
        assert_eq!(decode_csv(&raw.to_string()).expect("csv"), vec![raw]);
    }

    #[test]
    fn inflate_grows_from_a_tiny_buffer() {
        let gids: Vec<u32> = (0..256).collect();
        let raw = words(&gids);
        for hint in [1, 4, 128, 512, raw.len()] {
            let out = inflate(&zlib(&raw), hint, Compression::Zlib).expect("zlib");
            assert_eq!(out, raw, "zlib hint {hint}");
            let out = inflate(&gzip(&raw), hint, Compression::Gzip).expect("gzip");
            assert_eq!(out, raw, "gzip hint {hint}");
        }
    }

    #[test]
    fn inflate_rejects_broken_gzip() {
        let raw = words(&[9, 8, 7, 6]);
        let packed = gzip(&raw);

        let cut = &packed[..packed.len() - 3];
        assert!(matches!(
            inflate(cut, raw.len(), Compression::Gzip),
            Err(MapError::Decompress(_))
        ));

        let mut corrupt = packed.clone();
        let crc_at = corrupt.len() - 8;
        corrupt[crc_at] ^= 0xff;
        assert!(matches!(
            inflate(&corrupt, raw.len(), Compression::Gzip),
            Err(MapError::Decompress(_))
        ));

        let mut padded = packed;
        padded.extend_from_slice(b"junk");
        assert!(matches!(
            inflate(&padded, raw.len(), Compression::Gzip),
            Err(MapError::Decompress(_))
        ));
    }

    #[test]
    fn inflate_rejects_truncated_and_padded_streams() {
        let raw = words(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let packed = zlib(&raw);

        let cut = &packed[..packed.len() / 2];
        assert!(matches!(
            inflate(cut, raw.len(), Compression::Zlib),
            Err(MapError::Decompress(_))
        ));

        let mut padded = packed.clone();
        padded.extend_from_slice(b"junk");
        assert!(matches!(
            inflate(&padded, raw.len(), Compression::Zlib),
            Err(MapError::Decompress(_))
        ));

        assert!(inflate(b"definitely not zlib", 16, Compression::Zlib).is_err());
    }

    #[test]
    fn every_encoding_yields_the_same_grid() {
        let gids = [1u32, 0, 0x4000_0002, 3];
        let raw = words(&gids);
        let b64 = STANDARD.encode(&raw);
        let b64_zlib = STANDARD.encode(zlib(&raw));
        let b64_gzip = STANDARD.encode(gzip(&raw));

        let docs = [
            r#"<data><tile gid="1"/><tile/><tile gid="1073741826"/><tile gid="3"/></data>"#.to_owned(),
            r#"<data encoding="csv">1,0,1073741826,3</data>"#.to_owned(),
            format!(r#"<data encoding="base64">{b64}</data>"#),
            format!(r#"<data encoding="base64" compression="zlib">  {b64_zlib}
            </data>"#),
            format!(r#"<data encoding="base64" compression="gzip">{b64_gzip}</data>"#),
        ];
        for doc in &docs {
            let out = decode_layer_data(&data_node(doc), "ground", 4).expect(doc);
            assert_eq!(out, gids, "{doc}");
        }
    }

    #[test]
    fn wrong_tile_count_is_fatal() {
        let err = decode_layer_data(&data_node(r#"<data encoding="csv">1,2,3</data>"#), "ground", 4)
            .unwrap_err();
        assert!(matches!(
            err,
            MapError::InvalidLayerSize { expected: 4, found: 3, .. }
        ));
    }

    #[test]
    fn unknown_encoding_and_compression_are_fatal() {
        let err = decode_layer_data(&data_node(r#"<data encoding="xml">1</data>"#), "l", 1).unwrap_err();
        assert!(matches!(err, MapError::UnsupportedEncoding { .. }));

        let err = decode_layer_data(
            &data_node(r#"<data encoding="base64" compression="zstd">AAAA</data>"#),
            "l",
            1,
        )
        .unwrap_err();
        assert!(matches!(err, MapError::UnsupportedCompression { .. }));
    }

    #[test]
    fn bad_base64_is_fatal() {
        let err = decode_layer_data(&data_node(r#"<data encoding="base64">@@@@</data>"#), "l", 1)
            .unwrap_err();
        assert!(matches!(err, MapError::Base64(_)));
    }
}
