//! Stream codec
//!
//! Encodes an object instance as a flat byte stream in field declaration
//! order and decodes it back. Strings carry a `u32` byte length, lists a
//! `u32` element count; fixed arrays and nested objects carry no prefix.

mod decode;
pub mod io;
pub mod size;
mod walk;

use std::sync::Arc;

use log::trace;

use crate::error::{ChunkSchemaError, Result};
use crate::schema::{SchemaCatalog, SchemaId};
use crate::value::{ObjectGraph, ObjectId};

pub use io::{ByteSink, ByteSource, SliceSource, VecSink};
pub use size::SizeCalculator;

use walk::Walk;

/// Encoder/decoder bound to one schema catalog
#[derive(Debug, Clone)]
pub struct StreamCodec {
    catalog: Arc<SchemaCatalog>,
    sizes: SizeCalculator,
}

impl StreamCodec {
    pub fn new(catalog: Arc<SchemaCatalog>) -> Self {
        let sizes = SizeCalculator::new(Arc::clone(&catalog));
        Self { catalog, sizes }
    }

    pub fn catalog(&self) -> &Arc<SchemaCatalog> {
        &self.catalog
    }

    pub fn sizes(&self) -> &SizeCalculator {
        &self.sizes
    }

    /// Exact number of bytes [`encode`](Self::encode) will write for `root`
    pub fn size_of(&self, graph: &ObjectGraph, root: ObjectId) -> Result<u32> {
        self.sizes.size_of(graph, root)
    }

    /// Write the instance rooted at `root` to `sink`
    pub fn encode<S: ByteSink + ?Sized>(&self, graph: &ObjectGraph, root: ObjectId, sink: &mut S) -> Result<()> {
        self.check_graph(graph)?;
        let start = sink.bytes_written();
        for token in Walk::new(graph, root)? {
            token?.write_to(sink)?;
        }
        trace!("encoded {} as {} bytes", root, sink.bytes_written() - start);
        Ok(())
    }

    /// Encode into a buffer pre-sized by the size calculator
    pub fn encode_to_vec(&self, graph: &ObjectGraph, root: ObjectId) -> Result<Vec<u8>> {
        let size = self.size_of(graph, root)? as usize;
        let mut sink = VecSink::with_capacity(size);
        self.encode(graph, root, &mut sink)?;
        debug_assert_eq!(sink.bytes_written(), size, "size calculator disagrees with encoder");
        Ok(sink.into_inner())
    }

    /// Overwrite the instance at `root` from `source`, returning the bytes consumed
    ///
    /// The stream is checked in full before the instance is touched, so on
    /// error both the instance and `source` are left as they were.
    pub fn decode_into<S: ByteSource + Clone>(
        &self,
        graph: &mut ObjectGraph,
        root: ObjectId,
        source: &mut S,
    ) -> Result<usize> {
        self.check_graph(graph)?;
        let schema = graph.schema_of(root)?;
        self.catalog.validate(schema)?;

        let start = source.position();
        let mut lookahead = source.clone();
        decode::scan(&self.catalog, schema, &mut lookahead)?;
        decode::apply(graph, root, source)?;

        let consumed = source.position() - start;
        trace!("decoded {} bytes into {}", consumed, root);
        Ok(consumed)
    }

    /// Decode a buffer holding exactly one encoding of `schema`
    pub fn decode(&self, schema: SchemaId, bytes: &[u8]) -> Result<(ObjectGraph, ObjectId)> {
        let mut graph = ObjectGraph::new(Arc::clone(&self.catalog));
        let root = graph.instantiate(schema)?;
        let mut source = SliceSource::new(bytes);
        self.decode_into(&mut graph, root, &mut source)?;

        if source.remaining() != 0 {
            return Err(ChunkSchemaError::invalid_argument(
                "bytes",
                format!("{} trailing bytes after {}", source.remaining(), schema),
            ));
        }
        Ok((graph, root))
    }

    fn check_graph(&self, graph: &ObjectGraph) -> Result<()> {
        if Arc::ptr_eq(graph.catalog(), &self.catalog) {
            Ok(())
        } else {
            Err(ChunkSchemaError::invalid_argument(
                "graph",
                "object graph uses a different schema catalog",
            ))
        }
    }
}
