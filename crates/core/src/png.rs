//! Minimal PNG encoder for slot preview images.
//!
//! Writes 8-bit RGB images (alpha dropped) with a single zlib-compressed
//! IDAT chunk. Previews are small frame captures, so no filtering is done.

/// Encode an RGBA pixel buffer as a PNG file.
///
/// `rgba` holds `width * height * 4` bytes in row-major RGBA order.
pub fn encode_png(width: u32, height: u32, rgba: &[u8]) -> Vec<u8> {
    let mut png = Vec::with_capacity(rgba.len() / 2 + 64);

    // PNG signature
    png.extend_from_slice(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]);

    let mut ihdr = Vec::with_capacity(13);
    ihdr.extend_from_slice(&width.to_be_bytes());
    ihdr.extend_from_slice(&height.to_be_bytes());
    ihdr.push(8); // bit depth
    ihdr.push(2); // color type: RGB
    ihdr.push(0); // compression
    ihdr.push(0); // filter
    ihdr.push(0); // interlace
    write_chunk(&mut png, b"IHDR", &ihdr);

    write_chunk(&mut png, b"IDAT", &miniz_oxide::deflate::compress_to_vec_zlib(
        &filtered_rows(width, height, rgba), 6));
    write_chunk(&mut png, b"IEND", &[]);
    png
}

/// Scanlines with a leading filter byte (0 = None), RGB only.
fn filtered_rows(width: u32, height: u32, rgba: &[u8]) -> Vec<u8> {
    let row_bytes = width as usize * 3 + 1;
    let mut raw = Vec::with_capacity(row_bytes * height as usize);
    if width == 0 {
        return raw;
    }
    for row in rgba.chunks_exact(width as usize * 4).take(height as usize) {
        raw.push(0);
        for px in row.chunks_exact(4) {
            raw.extend_from_slice(&px[..3]);
        }
    }
    raw
}

fn write_chunk(out: &mut Vec<u8>, chunk_type: &[u8; 4], data: &[u8]) {
    out.extend_from_slice(&(data.len() as u32).to_be_bytes());
    out.extend_from_slice(chunk_type);
    out.extend_from_slice(data);
    out.extend_from_slice(&crc32(chunk_type, data).to_be_bytes());
}

// CRC-32 (PNG/zlib) over chunk type + data
fn crc32(chunk_type: &[u8], data: &[u8]) -> u32 {
    let mut crc: u32 = 0xFFFFFFFF;
    for &b in chunk_type.iter().chain(data.iter()) {
        crc ^= b as u32;
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB88320;
            } else {
                crc >>= 1;
            }
        }
    }
    crc ^ 0xFFFFFFFF
}
