/*
 * Copyright (c) 2026.
 *
 * This software is free software;
 *
 * You can redistribute it or modify it under terms of the MIT, Apache License or Zlib license
 */

//! The copy path: byte-copy an already-optimal PNG datastream while
//! joining its IDAT chunks and filtering the chunks the strip predicate
//! rejects. The joined IDAT length is known in advance (it is the sum
//! of the input IDAT payloads), so this path never needs to seek.

use std::io::Write;

use opng_core::bytestream::ByteReader;
use opng_core::chunk::{self, ChunkName};
use opng_png::crc::{calc_crc, Crc32};
use opng_png::PNG_SIGNATURE;

use crate::errors::OpngErrors;
use crate::stats::EncodingStats;

/// Copy the PNG datastream in `input` to `out`.
///
/// `idat_size` is the known total IDAT payload; `strip` decides which
/// chunks are dropped. Returns the output-side statistics.
pub fn copy_png(
    input: &[u8], datastream_offset: usize, idat_size: u64,
    strip: &dyn Fn(ChunkName) -> bool, out: &mut dyn Write
) -> Result<EncodingStats, OpngErrors> {
    let mut reader = ByteReader::new(&input[datastream_offset.min(input.len())..]);
    if reader.peek_at(0, 8).map(|sig| *sig == PNG_SIGNATURE).unwrap_or(false) {
        reader.skip(8);
    }

    let mut stats = EncodingStats {
        idat_size,
        ..EncodingStats::default()
    };
    let mut write = |bytes: &[u8], stats: &mut EncodingStats| -> Result<(), OpngErrors> {
        out.write_all(bytes).map_err(OpngErrors::Io)?;
        stats.file_size += bytes.len() as u64;
        Ok(())
    };

    write(&PNG_SIGNATURE, &mut stats)?;

    let mut idat_open = false;
    let mut idat_crc = Crc32::new();

    loop {
        let length = reader
            .get_u32_be()
            .map_err(|e| OpngErrors::Decode(e.into()))? as usize;
        let name = ChunkName(
            reader
                .get_bytes(4)
                .map_err(|e| OpngErrors::Decode(e.into()))?
                .try_into()
                .unwrap()
        );
        let data = reader
            .get_bytes(length)
            .map_err(|e| OpngErrors::Decode(e.into()))?;
        reader.skip(4); // the stored CRC; chunks are re-checksummed

        if name == chunk::IDAT {
            if !idat_open {
                // the joined IDAT header goes out once, with the known
                // total length
                idat_open = true;
                idat_crc = Crc32::new();
                idat_crc.update(&chunk::IDAT.0);
                write(&(idat_size as u32).to_be_bytes(), &mut stats)?;
                write(&chunk::IDAT.0, &mut stats)?;
            }
            idat_crc.update(data);
            write(data, &mut stats)?;
            continue;
        }

        if idat_open {
            // first non-IDAT chunk: close the joined IDAT
            idat_open = false;
            write(&idat_crc.finalize().to_be_bytes(), &mut stats)?;
        }

        if strip(name) {
            continue;
        }

        write(&(length as u32).to_be_bytes(), &mut stats)?;
        write(&name.0, &mut stats)?;
        write(data, &mut stats)?;
        let mut crc_input = Vec::with_capacity(4 + data.len());
        crc_input.extend_from_slice(&name.0);
        crc_input.extend_from_slice(data);
        write(&calc_crc(&crc_input).to_be_bytes(), &mut stats)?;

        if name == chunk::PLTE || name == chunk::TRNS {
            stats.plte_trns_size += length as u64 + 12;
        }
        if name == chunk::IEND {
            break;
        }
    }

    Ok(stats)
}
