//! Type ids and descriptors

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::layout::FixedLayout;
use crate::schema::SchemaId;

/// Process-unique small integer naming a registered type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TypeId(pub(crate) u16);

impl TypeId {
    pub fn raw(self) -> u16 {
        self.0
    }
}

impl fmt::Display for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type#{}", self.0)
    }
}

/// Representations a type supports, fixed at registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Representation {
    /// Stream codec only
    Streamable,
    /// Stream codec and fixed-offset layout
    Both,
}

/// Everything the runtime knows about one registered type
#[derive(Debug, Clone)]
pub struct TypeDescriptor {
    pub(crate) type_id: TypeId,
    pub(crate) schema: SchemaId,
    pub(crate) name: String,
    pub(crate) representation: Representation,
    pub(crate) layout: Option<Arc<FixedLayout>>,
}

impl TypeDescriptor {
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    pub fn schema(&self) -> SchemaId {
        self.schema
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn representation(&self) -> Representation {
        self.representation
    }

    /// Fixed layout, present exactly for [`Representation::Both`]
    pub fn layout(&self) -> Option<&Arc<FixedLayout>> {
        self.layout.as_ref()
    }

    /// Record size of a fixed-layout type
    pub fn fixed_size(&self) -> Option<u32> {
        self.layout.as_ref().map(|layout| layout.total_size())
    }

    pub fn is_fixed(&self) -> bool {
        self.representation == Representation::Both
    }
}
