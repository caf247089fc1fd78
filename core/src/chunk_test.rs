#[cfg(test)]
mod tests {
    use crate::chunk::{ChunkBuilder, ChunkImage};
    use crate::dispatch::Opcode;

    #[test]
    fn decode_reads_header_and_literals() {
        let mut builder = ChunkBuilder::new();
        builder
            .static_size(16)
            .literal_u8(0xAB)
            .literal_u16(0xBEEF)
            .literal_u32(0xDEAD_BEEF)
            .literal_u64(0x0123_4567_89AB_CDEF)
            .literal_f32(-52.0)
            .op(Opcode::Return);

        let image = ChunkImage::decode(builder.finish()).expect("decode");

        assert_eq!(image.static_size, 16);
        assert_eq!(
            image.literals,
            vec![
                0xAB,
                0xBEEF,
                0xDEAD_BEEF,
                0x0123_4567_89AB_CDEF,
                (-52.0f32).to_bits() as u64,
            ]
        );
        // header + the five literal records
        assert_eq!(image.code_start, 6 + 2 + 3 + 5 + 9 + 5);
        assert_eq!(image.chunk.byte(image.code_start), Opcode::Return as u8);
    }

    #[test]
    fn decode_rejects_truncated_header() {
        assert!(ChunkImage::decode(Vec::new()).is_err());
        assert!(ChunkImage::decode(vec![0, 0, 0]).is_err());
        // static size present, literal count cut short
        assert!(ChunkImage::decode(vec![0, 0, 0, 0, 1]).is_err());
    }

    #[test]
    fn decode_rejects_literal_payload_past_end() {
        let mut bytes = vec![0, 0, 0, 0, 1, 0];
        bytes.push(8); // u64 record with only two payload bytes
        bytes.extend_from_slice(&[1, 2]);
        let err = ChunkImage::decode(bytes).unwrap_err();
        assert!(format!("{err:#}").contains("literal record 0"));
    }

    #[test]
    fn unrecognized_literal_size_yields_zero_cell() {
        // static 0, one literal with size byte 3, then a lone opcode
        let bytes = vec![0, 0, 0, 0, 1, 0, 3, Opcode::Return as u8];
        let image = ChunkImage::decode(bytes).expect("decode");

        assert_eq!(image.literals, vec![0]);
        // the bogus size consumes no payload; code begins right after it
        assert_eq!(image.code_start, 7);
    }

    #[test]
    fn empty_code_stream_is_valid() {
        let image = ChunkImage::decode(vec![0, 0, 0, 0, 0, 0]).expect("decode");
        assert!(image.literals.is_empty());
        assert_eq!(image.code_start, image.chunk.len());
    }

    #[test]
    fn builder_position_tracks_code_bytes() {
        let mut builder = ChunkBuilder::new();
        builder.literal_u8(1);
        assert_eq!(builder.position(), 6 + 2);

        builder.op(Opcode::JumpI8).i8(2);
        assert_eq!(builder.position(), 6 + 2 + 2);
    }

    #[test]
    fn builder_patches_deltas_in_place() {
        let mut builder = ChunkBuilder::new();
        builder.op(Opcode::Call);
        let delta_at = builder.position();
        builder.i32(0).byte(0).byte(0);
        builder.patch_i32(delta_at, -42);

        let bytes = builder.finish();
        let start = delta_at as usize;
        assert_eq!(&bytes[start..start + 4], &(-42i32).to_le_bytes());
    }
}
