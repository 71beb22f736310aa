//! Stream codec behaviour across nested, recursive and fixed-width types

use std::sync::Arc;

use chunkschema::{
    ChunkId, ChunkSchemaError, FieldKind, FixedLayout, ObjectGraph, SchemaBuilder, SchemaCatalog,
    SchemaId, SliceSource, StreamCodec, Value,
};

#[cfg(test)]
mod codec_tests {
    use super::*;

    struct Schemas {
        catalog: Arc<SchemaCatalog>,
        flagged: SchemaId,
        text: SchemaId,
        tree: SchemaId,
        reading: SchemaId,
        person: SchemaId,
        link: SchemaId,
    }

    fn schemas() -> Schemas {
        let _ = env_logger::builder().is_test(true).try_init();

        let mut catalog = SchemaCatalog::new();
        let flagged = catalog
            .register("Flagged", SchemaBuilder::new().bool("b").int32("n"))
            .unwrap();
        let text = catalog
            .register("Text", SchemaBuilder::new().string("s"))
            .unwrap();
        let tree = catalog.declare("TreeNode").unwrap();
        catalog
            .define(
                tree,
                SchemaBuilder::new()
                    .string("label")
                    .list("children", FieldKind::Object(tree)),
            )
            .unwrap();
        let reading = catalog
            .register(
                "Reading",
                SchemaBuilder::new()
                    .char("unit")
                    .float64("value")
                    .int16("sensor")
                    .object("flag", flagged)
                    .fixed_array("window", FieldKind::Int8, 4),
            )
            .unwrap();
        let person = catalog
            .register(
                "Person",
                SchemaBuilder::new()
                    .string("name")
                    .int8("age")
                    .list("scores", FieldKind::Float32)
                    .list("tags", FieldKind::Str)
                    .object("best", reading)
                    .list("history", FieldKind::Object(reading)),
            )
            .unwrap();
        let link = catalog.declare("Link").unwrap();
        catalog
            .define(
                link,
                SchemaBuilder::new()
                    .int64("value")
                    .reference("next", link)
                    .fixed_array("peers", FieldKind::Ref(link), 2),
            )
            .unwrap();

        Schemas {
            catalog: Arc::new(catalog),
            flagged,
            text,
            tree,
            reading,
            person,
            link,
        }
    }

    #[test]
    fn test_fixed_record_bytes() {
        let s = schemas();
        let codec = StreamCodec::new(Arc::clone(&s.catalog));
        let mut graph = ObjectGraph::new(Arc::clone(&s.catalog));
        let root = graph.instantiate(s.flagged).unwrap();
        graph.set(root, "b", true).unwrap();
        graph.set(root, "n", 42i32).unwrap();

        assert_eq!(codec.size_of(&graph, root).unwrap(), 5);
        let bytes = codec.encode_to_vec(&graph, root).unwrap();
        assert_eq!(bytes, vec![1, 42, 0, 0, 0]);
    }

    #[test]
    fn test_string_is_length_prefixed() {
        let s = schemas();
        let codec = StreamCodec::new(Arc::clone(&s.catalog));
        let mut graph = ObjectGraph::new(Arc::clone(&s.catalog));
        let root = graph.instantiate(s.text).unwrap();
        graph.set(root, "s", "hi").unwrap();

        assert_eq!(codec.size_of(&graph, root).unwrap(), 6);
        assert_eq!(codec.encode_to_vec(&graph, root).unwrap().len(), 6);
    }

    #[test]
    fn test_truncated_payload_fails_without_mutation() {
        let s = schemas();
        let codec = StreamCodec::new(Arc::clone(&s.catalog));
        let mut graph = ObjectGraph::new(Arc::clone(&s.catalog));
        let root = graph.instantiate(s.tree).unwrap();
        graph.set(root, "label", "root").unwrap();
        graph.push_new(root, "children").unwrap();

        let mut template = ObjectGraph::new(Arc::clone(&s.catalog));
        let full_root = template.instantiate(s.tree).unwrap();
        template.set(full_root, "label", "other").unwrap();
        let full = codec.encode_to_vec(&template, full_root).unwrap();

        let before = graph.clone();
        for cut in 0..full.len() {
            let mut source = SliceSource::new(&full[..cut]);
            let err = codec.decode_into(&mut graph, root, &mut source).unwrap_err();
            assert!(
                matches!(err, ChunkSchemaError::TruncatedStream { .. }),
                "cut at {} gave {:?}",
                cut,
                err
            );
            assert!(graph.structurally_equal(root, &before, root));
        }
    }

    #[test]
    fn test_oversized_count_is_truncation() {
        let s = schemas();
        let codec = StreamCodec::new(Arc::clone(&s.catalog));
        // label "", then a count of u32::MAX children with nothing behind it
        let bytes = [0u8, 0, 0, 0, 0xff, 0xff, 0xff, 0xff];
        assert!(matches!(
            codec.decode(s.tree, &bytes),
            Err(ChunkSchemaError::TruncatedStream { .. })
        ));
    }

    #[test]
    fn test_recursive_tree_round_trip() {
        let s = schemas();
        let codec = StreamCodec::new(Arc::clone(&s.catalog));
        let mut graph = ObjectGraph::new(Arc::clone(&s.catalog));
        let root = graph.instantiate(s.tree).unwrap();
        graph.set(root, "label", "root").unwrap();

        // a deep chain plus a few siblings
        let mut parent = root;
        for depth in 0..200 {
            let child = graph.push_new(parent, "children").unwrap();
            graph.set(child, "label", format!("d{}", depth)).unwrap();
            if depth % 50 == 0 {
                let sibling = graph.push_new(parent, "children").unwrap();
                graph.set(sibling, "label", "leaf").unwrap();
            }
            parent = child;
        }

        let bytes = codec.encode_to_vec(&graph, root).unwrap();
        assert_eq!(bytes.len() as u32, codec.size_of(&graph, root).unwrap());

        let (decoded, decoded_root) = codec.decode(s.tree, &bytes).unwrap();
        assert!(graph.structurally_equal(root, &decoded, decoded_root));
        assert_eq!(codec.encode_to_vec(&decoded, decoded_root).unwrap(), bytes);
    }

    #[test]
    fn test_mixed_record_round_trip() {
        let s = schemas();
        let codec = StreamCodec::new(Arc::clone(&s.catalog));
        let mut graph = ObjectGraph::new(Arc::clone(&s.catalog));
        let person = graph.instantiate(s.person).unwrap();
        graph.set(person, "name", "Ada").unwrap();
        graph.set(person, "age", 36i8).unwrap();
        graph.set(person, "scores", vec![1.5f32, f32::NAN, -0.0]).unwrap();
        graph.set(person, "tags", vec!["x", "yz"]).unwrap();

        let best = graph.child(person, "best").unwrap();
        graph.set(best, "unit", '°').unwrap();
        graph.set(best, "value", 21.25f64).unwrap();
        let flag = graph.child(best, "flag").unwrap();
        graph.set(flag, "n", -1i32).unwrap();

        let old = graph.push_new(person, "history").unwrap();
        graph.set(old, "window", vec![1i8, 2, 3, 4]).unwrap();

        let bytes = codec.encode_to_vec(&graph, person).unwrap();
        let expected = (4 + 3) + 1 + (4 + 3 * 4) + (4 + (4 + 1) + (4 + 2)) + 21 + (4 + 21);
        assert_eq!(bytes.len(), expected);

        let (decoded, root) = codec.decode(s.person, &bytes).unwrap();
        assert!(graph.structurally_equal(person, &decoded, root));
        let scores = decoded.get(root, "scores").unwrap().as_array().unwrap();
        assert!(matches!(scores[1], Value::Float32(v) if v.is_nan()));
    }

    #[test]
    fn test_fixed_width_stream_matches_layout_blob() {
        let s = schemas();
        let codec = StreamCodec::new(Arc::clone(&s.catalog));
        let layout = FixedLayout::compute(&s.catalog, s.reading).unwrap();
        assert_eq!(layout.total_size(), 2 + 8 + 2 + 5 + 4);

        let mut graph = ObjectGraph::new(Arc::clone(&s.catalog));
        let reading = graph.instantiate(s.reading).unwrap();
        graph.set(reading, "sensor", 0x0a0bi16).unwrap();
        graph.set(reading, "window", vec![9i8, 8, 7, 6]).unwrap();
        let flag = graph.child(reading, "flag").unwrap();
        graph.set(flag, "b", true).unwrap();

        let bytes = codec.encode_to_vec(&graph, reading).unwrap();
        assert_eq!(bytes.len(), layout.total_size() as usize);

        let sensor = layout.offset_of("sensor").unwrap() as usize;
        assert_eq!(&bytes[sensor..sensor + 2], &[0x0b, 0x0a]);
        let flag_b = layout.locate("flag.b").unwrap().offset as usize;
        assert_eq!(bytes[flag_b], 1);
        let window = layout.locate("window[1]").unwrap().offset as usize;
        assert_eq!(bytes[window], 8);
    }

    #[test]
    fn test_invalid_payloads_rejected() {
        let s = schemas();
        let codec = StreamCodec::new(Arc::clone(&s.catalog));

        // bool byte other than 0/1
        assert!(matches!(
            codec.decode(s.flagged, &[2, 0, 0, 0, 0]),
            Err(ChunkSchemaError::InvalidArgument { .. })
        ));
        // invalid UTF-8
        assert!(matches!(
            codec.decode(s.text, &[2, 0, 0, 0, 0xff, 0xfe]),
            Err(ChunkSchemaError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_decode_reuses_nested_defaults() {
        let s = schemas();
        let codec = StreamCodec::new(Arc::clone(&s.catalog));
        let mut source_graph = ObjectGraph::new(Arc::clone(&s.catalog));
        let src = source_graph.instantiate(s.reading).unwrap();
        let src_flag = source_graph.child(src, "flag").unwrap();
        source_graph.set(src_flag, "n", 7i32).unwrap();
        let bytes = codec.encode_to_vec(&source_graph, src).unwrap();

        let mut graph = ObjectGraph::new(Arc::clone(&s.catalog));
        let reading = graph.instantiate(s.reading).unwrap();
        let flag = graph.child(reading, "flag").unwrap();
        let nodes = graph.len();

        codec
            .decode_into(&mut graph, reading, &mut SliceSource::new(&bytes))
            .unwrap();
        assert_eq!(graph.len(), nodes);
        assert_eq!(graph.child(reading, "flag").unwrap(), flag);
        assert_eq!(graph.get(flag, "n").unwrap(), &Value::Int32(7));
    }

    #[test]
    fn test_huge_count_fails_before_reading_elements() {
        let s = schemas();
        let codec = StreamCodec::new(Arc::clone(&s.catalog));
        // empty name, age, no scores, then five million tags with no bytes behind them
        let mut bytes = vec![0u8, 0, 0, 0, 30, 0, 0, 0, 0];
        bytes.extend_from_slice(&5_000_000u32.to_le_bytes());
        match codec.decode(s.person, &bytes) {
            Err(ChunkSchemaError::TruncatedStream { needed, remaining }) => {
                assert_eq!(needed, 20_000_000);
                assert_eq!(remaining, 0);
            }
            other => panic!("expected truncation, got {:?}", other),
        }

        // a list of field-less records could not be bounded this way
        let mut catalog = SchemaCatalog::new();
        assert!(matches!(
            catalog.register("Empty", SchemaBuilder::new()),
            Err(ChunkSchemaError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn test_repeated_decode_recycles_dropped_nodes() {
        let s = schemas();
        let codec = StreamCodec::new(Arc::clone(&s.catalog));

        let mut wide = ObjectGraph::new(Arc::clone(&s.catalog));
        let wide_root = wide.instantiate(s.tree).unwrap();
        for i in 0..3 {
            let child = wide.push_new(wide_root, "children").unwrap();
            wide.set(child, "label", format!("c{}", i)).unwrap();
            wide.push_new(child, "children").unwrap();
            wide.push_new(child, "children").unwrap();
        }
        let wide_bytes = codec.encode_to_vec(&wide, wide_root).unwrap();

        let mut narrow = ObjectGraph::new(Arc::clone(&s.catalog));
        let narrow_root = narrow.instantiate(s.tree).unwrap();
        narrow.push_new(narrow_root, "children").unwrap();
        let narrow_bytes = codec.encode_to_vec(&narrow, narrow_root).unwrap();

        let mut graph = ObjectGraph::new(Arc::clone(&s.catalog));
        let root = graph.instantiate(s.tree).unwrap();
        for _ in 0..500 {
            codec
                .decode_into(&mut graph, root, &mut SliceSource::new(&wide_bytes))
                .unwrap();
            assert_eq!(graph.len(), 10);
            codec
                .decode_into(&mut graph, root, &mut SliceSource::new(&narrow_bytes))
                .unwrap();
            assert_eq!(graph.len(), 2);
        }

        assert_eq!(graph.capacity(), 10);
        assert!(graph.structurally_equal(root, &narrow, narrow_root));
    }

    #[test]
    fn test_reference_fields_encode_chunk_ids() {
        let s = schemas();
        let codec = StreamCodec::new(Arc::clone(&s.catalog));
        let layout = FixedLayout::compute(&s.catalog, s.link).unwrap();
        assert_eq!(layout.total_size(), 32);

        let next = ChunkId::new(2, 9);
        let mut graph = ObjectGraph::new(Arc::clone(&s.catalog));
        let link = graph.instantiate(s.link).unwrap();
        assert_eq!(graph.get(link, "next").unwrap(), &Value::Ref(ChunkId::NULL));
        graph.set(link, "value", 5i64).unwrap();
        graph.set(link, "next", next).unwrap();
        graph.set(link, "peers", vec![ChunkId::new(2, 1), next]).unwrap();
        assert!(graph.set(link, "next", 3i64).is_err());

        let bytes = codec.encode_to_vec(&graph, link).unwrap();
        assert_eq!(bytes.len(), 32);
        let peer = layout.locate("peers[1]").unwrap().offset as usize;
        assert_eq!(&bytes[peer..peer + 8], &next.raw().to_le_bytes());

        let (decoded, root) = codec.decode(s.link, &bytes).unwrap();
        assert_eq!(decoded.get(root, "next").unwrap().as_chunk_id(), Some(next));
        assert!(graph.structurally_equal(link, &decoded, root));
    }

    #[test]
    fn test_char_is_one_code_unit() {
        let s = schemas();
        let codec = StreamCodec::new(Arc::clone(&s.catalog));
        let mut graph = ObjectGraph::new(Arc::clone(&s.catalog));
        let reading = graph.instantiate(s.reading).unwrap();
        graph.set(reading, "unit", 'Ω').unwrap();

        let mut bytes = codec.encode_to_vec(&graph, reading).unwrap();
        assert_eq!(&bytes[..2], &[0xA9, 0x03]);
        let (decoded, root) = codec.decode(s.reading, &bytes).unwrap();
        assert_eq!(decoded.get(root, "unit").unwrap(), &Value::Char('Ω'));

        // a lone surrogate is not a character
        bytes[..2].copy_from_slice(&0xD800u16.to_le_bytes());
        assert!(matches!(
            codec.decode(s.reading, &bytes),
            Err(ChunkSchemaError::InvalidArgument { .. })
        ));
    }
}
