//! Process context produced by bootstrap

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use log::{debug, trace};

use crate::chunk::{ChunkId, ChunkManager, NodeId, PinGuard};
use crate::codec::{SliceSource, StreamCodec};
use crate::error::{ChunkSchemaError, Result};
use crate::layout::FixedLayout;
use crate::raw::{FixedRecordCodec, HandleAccess, RawAccess, RecordAccess};
use crate::schema::{FieldKind, SchemaCatalog, SchemaId};
use crate::stats::ChunkStats;
use crate::value::{ObjectGraph, ObjectId};

use super::gate::Bootstrap;
use super::types::{TypeDescriptor, TypeId};

/// Registered types plus the chunk manager of this node
///
/// Only [`TypeRegistry::init`](super::TypeRegistry::init) creates one.
/// Every chunk created through the runtime is tagged with its type, so
/// records can later be decoded without outside knowledge. Tags of chunks
/// removed behind the runtime's back are dropped when next looked up.
#[derive(Debug)]
pub struct Runtime {
    catalog: Arc<SchemaCatalog>,
    codec: StreamCodec,
    descriptors: Vec<TypeDescriptor>,
    by_schema: HashMap<SchemaId, TypeId>,
    manager: ChunkManager,
    record_types: RwLock<HashMap<ChunkId, TypeId>>,
}

impl Runtime {
    pub(crate) fn new(
        catalog: Arc<SchemaCatalog>,
        descriptors: Vec<TypeDescriptor>,
        by_schema: HashMap<SchemaId, TypeId>,
        bootstrap: Bootstrap,
    ) -> Self {
        Self {
            codec: StreamCodec::new(Arc::clone(&catalog)),
            catalog,
            descriptors,
            by_schema,
            manager: ChunkManager::new(bootstrap.node_id, bootstrap.service),
            record_types: RwLock::new(HashMap::new()),
        }
    }

    pub fn node_id(&self) -> NodeId {
        self.manager.node_id()
    }

    pub fn catalog(&self) -> &Arc<SchemaCatalog> {
        &self.catalog
    }

    pub fn codec(&self) -> &StreamCodec {
        &self.codec
    }

    pub fn manager(&self) -> &ChunkManager {
        &self.manager
    }

    pub fn types(&self) -> &[TypeDescriptor] {
        &self.descriptors
    }

    pub fn stats(&self) -> ChunkStats {
        self.manager.stats()
    }

    /// Empty object graph over this runtime's catalog
    pub fn new_graph(&self) -> ObjectGraph {
        ObjectGraph::new(Arc::clone(&self.catalog))
    }

    pub fn descriptor(&self, type_id: TypeId) -> Result<&TypeDescriptor> {
        self.descriptors
            .get(type_id.0 as usize)
            .ok_or_else(|| ChunkSchemaError::unknown_handle(type_id))
    }

    pub fn descriptor_of(&self, schema: SchemaId) -> Result<&TypeDescriptor> {
        let type_id = self
            .by_schema
            .get(&schema)
            .ok_or_else(|| ChunkSchemaError::unknown_handle(schema))?;
        self.descriptor(*type_id)
    }

    fn fixed_layout(&self, type_id: TypeId) -> Result<&Arc<FixedLayout>> {
        let descriptor = self.descriptor(type_id)?;
        descriptor.layout().ok_or_else(|| {
            ChunkSchemaError::schema_violation(descriptor.name(), "type has no fixed layout")
        })
    }

    fn tag(&self, chunk: ChunkId, type_id: TypeId) -> Result<()> {
        self.record_types.write()?.insert(chunk, type_id);
        Ok(())
    }

    /// New zero-filled record of a fixed-layout type
    pub fn create_record(&self, type_id: TypeId) -> Result<ChunkId> {
        let size = self.fixed_layout(type_id)?.total_size() as usize;
        let chunk = self.manager.create(size)?;
        self.tag(chunk, type_id)?;
        trace!("created {} record {}", type_id, chunk);
        Ok(chunk)
    }

    /// `count` new zero-filled records of one fixed-layout type
    pub fn create_records(&self, type_id: TypeId, count: usize) -> Result<Vec<ChunkId>> {
        let size = self.fixed_layout(type_id)?.total_size() as usize;
        let chunks = self.manager.create_batch(size, count)?;
        let mut tags = self.record_types.write()?;
        for chunk in &chunks {
            tags.insert(*chunk, type_id);
        }
        trace!("created {} {} records", count, type_id);
        Ok(chunks)
    }

    /// Type a record was created with
    pub fn type_of(&self, chunk: ChunkId) -> Result<TypeId> {
        let tagged = self.record_types.read()?.get(&chunk).copied();
        match tagged {
            Some(type_id) if self.manager.exists(chunk) => Ok(type_id),
            Some(_) => {
                self.record_types.write()?.remove(&chunk);
                debug!("dropped stale type tag of {}", chunk);
                Err(ChunkSchemaError::unknown_handle(chunk))
            }
            None => Err(ChunkSchemaError::unknown_handle(chunk)),
        }
    }

    /// Drop the type tags of every chunk that no longer exists
    pub fn prune_stale_tags(&self) -> Result<usize> {
        let mut tags = self.record_types.write()?;
        let before = tags.len();
        tags.retain(|chunk, _| self.manager.exists(*chunk));
        let pruned = before - tags.len();
        if pruned > 0 {
            debug!("pruned {} stale type tags", pruned);
        }
        Ok(pruned)
    }

    pub fn remove_record(&self, chunk: ChunkId) -> Result<()> {
        self.type_of(chunk)?;
        let removed = self.manager.remove(chunk);
        if matches!(removed, Ok(()) | Err(ChunkSchemaError::UnknownHandle { .. })) {
            self.record_types.write()?.remove(&chunk);
        }
        removed
    }

    /// Remove several records; nothing is removed unless every one can be
    pub fn remove_records(&self, chunks: &[ChunkId]) -> Result<()> {
        for chunk in chunks {
            self.type_of(*chunk)?;
        }
        self.manager.remove_batch(chunks)?;
        let mut tags = self.record_types.write()?;
        for chunk in chunks {
            tags.remove(chunk);
        }
        Ok(())
    }

    /// Field access to a fixed-layout record through the chunk service
    pub fn record(&self, chunk: ChunkId) -> Result<RecordAccess<'_, HandleAccess<'_>>> {
        let layout = self.fixed_layout(self.type_of(chunk)?)?;
        Ok(RecordAccess::new(layout, HandleAccess::new(&self.manager, chunk)))
    }

    /// Pin a fixed-layout record for direct field access
    pub fn pin_record(&self, chunk: ChunkId) -> Result<PinnedRecord<'_>> {
        let layout = self.fixed_layout(self.type_of(chunk)?)?;
        let guard = self.manager.pin(chunk)?;
        Ok(PinnedRecord { guard, layout })
    }

    /// Pin several records; on failure the pins already taken are released
    pub fn pin_records(&self, chunks: &[ChunkId]) -> Result<Vec<PinnedRecord<'_>>> {
        chunks.iter().map(|chunk| self.pin_record(*chunk)).collect()
    }

    /// Record named by a reference field, `None` while the field is unset
    /// (null or invalid)
    ///
    /// The target must still exist and be of the type the field names.
    pub fn follow(&self, chunk: ChunkId, path: &str) -> Result<Option<ChunkId>> {
        let record = self.record(chunk)?;
        let target = match record.layout().locate(path)?.kind {
            FieldKind::Ref(schema) => *schema,
            other => {
                return Err(ChunkSchemaError::invalid_argument(
                    "path",
                    format!("{} is a {}, not a reference", path, other),
                ))
            }
        };

        let next = record.read(path)?.as_chunk_id().ok_or_else(|| {
            ChunkSchemaError::invalid_argument("path", format!("{} holds no chunk id", path))
        })?;
        if next.is_unset() {
            return Ok(None);
        }

        let actual = self.descriptor(self.type_of(next)?)?;
        if actual.schema() != target {
            return Err(ChunkSchemaError::schema_violation(
                self.catalog.name_of(target).unwrap_or_default(),
                format!("{} points at a {} record", path, actual.name()),
            ));
        }
        Ok(Some(next))
    }

    fn record_codec(&self, type_id: TypeId) -> Result<FixedRecordCodec> {
        Ok(FixedRecordCodec::new(
            self.codec.clone(),
            Arc::clone(self.fixed_layout(type_id)?),
        ))
    }

    fn check_type(&self, chunk: ChunkId, graph: &ObjectGraph, node: ObjectId) -> Result<TypeId> {
        let type_id = self.type_of(chunk)?;
        let expected = self.descriptor(type_id)?.schema();
        let actual = graph.schema_of(node)?;
        if expected != actual {
            return Err(ChunkSchemaError::invalid_argument(
                "object",
                format!("{} holds {}, {} is a {}", chunk, type_id, node, actual),
            ));
        }
        Ok(type_id)
    }

    /// Copy an instance into an existing fixed-layout record
    pub fn store_record(&self, chunk: ChunkId, graph: &ObjectGraph, node: ObjectId) -> Result<()> {
        let type_id = self.check_type(chunk, graph, node)?;
        self.record_codec(type_id)?
            .store(graph, node, &HandleAccess::new(&self.manager, chunk))
    }

    /// Overwrite an instance from a fixed-layout record
    pub fn load_record(&self, chunk: ChunkId, graph: &mut ObjectGraph, node: ObjectId) -> Result<()> {
        let type_id = self.check_type(chunk, graph, node)?;
        self.record_codec(type_id)?
            .load(graph, node, &HandleAccess::new(&self.manager, chunk))
    }

    /// Encode an instance of any registered type into a new chunk sized
    /// exactly to its encoding
    pub fn store_stream(&self, graph: &ObjectGraph, node: ObjectId) -> Result<ChunkId> {
        let type_id = self.descriptor_of(graph.schema_of(node)?)?.type_id();
        let bytes = self.codec.encode_to_vec(graph, node)?;
        let chunk = self.manager.create(bytes.len())?;
        if let Err(e) = self.manager.write(chunk, 0, &bytes) {
            self.manager.remove(chunk)?;
            return Err(e);
        }
        self.tag(chunk, type_id)?;
        trace!("streamed {} ({} bytes) into {}", type_id, bytes.len(), chunk);
        Ok(chunk)
    }

    /// Decode a record written by [`store_stream`](Self::store_stream)
    pub fn load_stream(&self, chunk: ChunkId) -> Result<(ObjectGraph, ObjectId)> {
        let schema = self.descriptor(self.type_of(chunk)?)?.schema();
        let mut bytes = vec![0u8; self.manager.size_of(chunk)?];
        HandleAccess::new(&self.manager, chunk).read_bytes(0, &mut bytes)?;

        let mut graph = self.new_graph();
        let root = graph.instantiate(schema)?;
        self.codec
            .decode_into(&mut graph, root, &mut SliceSource::new(&bytes))?;
        Ok((graph, root))
    }
}

/// A pinned fixed-layout record
#[derive(Debug)]
pub struct PinnedRecord<'a> {
    guard: PinGuard<'a>,
    layout: &'a FixedLayout,
}

impl<'a> PinnedRecord<'a> {
    pub fn chunk(&self) -> ChunkId {
        self.guard.id()
    }

    pub fn layout(&self) -> &'a FixedLayout {
        self.layout
    }

    /// Field access straight into pinned memory
    pub fn fields(&self) -> RecordAccess<'a, &PinGuard<'a>> {
        RecordAccess::new(self.layout, &self.guard)
    }

    /// Raw bytes of the whole record
    pub fn to_vec(&self) -> Vec<u8> {
        self.guard.to_vec()
    }

    pub fn unpin(self) -> Result<()> {
        self.guard.unpin()
    }
}
