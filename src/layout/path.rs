//! Field paths such as `pos.x` or `samples[3]`

use crate::error::{ChunkSchemaError, Result};
use crate::schema::FieldKind;

use super::{element_of, FixedLayout};

/// Where a path lands inside a record
#[derive(Debug, Clone, Copy)]
pub struct Located<'a> {
    pub offset: u32,
    pub width: u32,
    pub kind: &'a FieldKind,
    /// Layout of the record at this position, if the kind embeds one
    pub layout: Option<&'a FixedLayout>,
}

fn path_error(path: &str, message: impl Into<String>) -> ChunkSchemaError {
    ChunkSchemaError::invalid_argument("path", format!("{}: {}", path, message.into()))
}

/// Split `name[1][2]` into the name and its indices
fn parse_segment<'p>(path: &str, segment: &'p str) -> Result<(&'p str, Vec<u32>)> {
    let (name, mut rest) = match segment.find('[') {
        Some(pos) => segment.split_at(pos),
        None => (segment, ""),
    };
    if name.is_empty() {
        return Err(path_error(path, "empty field name"));
    }

    let mut indices = Vec::new();
    while !rest.is_empty() {
        let close = rest
            .find(']')
            .filter(|_| rest.starts_with('['))
            .ok_or_else(|| path_error(path, format!("malformed index in {}", segment)))?;
        let index = rest[1..close]
            .parse::<u32>()
            .map_err(|_| path_error(path, format!("bad index {}", &rest[1..close])))?;
        indices.push(index);
        rest = &rest[close + 1..];
    }
    Ok((name, indices))
}

impl FixedLayout {
    /// Resolve a dotted, optionally indexed path to its offset and kind
    pub fn locate<'a>(&'a self, path: &str) -> Result<Located<'a>> {
        let mut layout = self;
        let mut here: Option<Located<'a>> = None;

        for segment in path.split('.') {
            if let Some(previous) = here {
                layout = match (previous.kind, previous.layout) {
                    (FieldKind::Object(_), Some(nested)) => nested,
                    _ => {
                        return Err(path_error(
                            path,
                            format!("{} is not a record", previous.kind),
                        ))
                    }
                };
            }

            let (name, indices) = parse_segment(path, segment)?;
            let slot = layout
                .field(name)
                .ok_or_else(|| path_error(path, format!("{} has no field {}", layout.name(), name)))?;

            let base = here.map_or(0, |h| h.offset);
            let mut offset = base + slot.offset;
            let mut width = slot.width;
            let mut kind = &slot.kind;
            for index in indices {
                let (element, count) = element_of(kind)
                    .ok_or_else(|| path_error(path, format!("{} is not an array", name)))?;
                if index >= count {
                    return Err(path_error(
                        path,
                        format!("index {} out of range for {} elements", index, count),
                    ));
                }
                width /= count;
                offset += width * index;
                kind = element;
            }

            here = Some(Located {
                offset,
                width,
                kind,
                layout: slot.layout.as_deref(),
            });
        }

        here.ok_or_else(|| path_error(path, "empty path"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{SchemaBuilder, SchemaCatalog};

    fn sensor_layout() -> std::sync::Arc<FixedLayout> {
        let mut catalog = SchemaCatalog::new();
        let point = catalog
            .register("Point", SchemaBuilder::new().int32("x").int32("y"))
            .unwrap();
        let sensor = catalog
            .register(
                "Sensor",
                SchemaBuilder::new()
                    .bool("active")
                    .object("pos", point)
                    .fixed_array("samples", FieldKind::Float32, 4)
                    .fixed_array("track", FieldKind::Object(point), 2)
                    .fixed_array("grid", FieldKind::fixed_array(FieldKind::Int8, 3), 2),
            )
            .unwrap();
        FixedLayout::compute(&catalog, sensor).unwrap()
    }

    #[test]
    fn test_locate_nested_and_indexed() {
        let layout = sensor_layout();

        let x = layout.locate("pos.y").unwrap();
        assert_eq!((x.offset, x.width), (5, 4));
        assert_eq!(x.kind, &FieldKind::Int32);

        let sample = layout.locate("samples[3]").unwrap();
        assert_eq!((sample.offset, sample.width), (9 + 12, 4));

        let track = layout.locate("track[1].x").unwrap();
        assert_eq!(track.offset, 25 + 8);

        let cell = layout.locate("grid[1][2]").unwrap();
        assert_eq!((cell.offset, cell.width), (41 + 3 + 2, 1));
        assert_eq!(layout.total_size(), 47);
    }

    #[test]
    fn test_locate_errors() {
        let layout = sensor_layout();
        for bad in ["", "nope", "samples[4]", "active.x", "pos[0]", "samples[", "samples[x]"] {
            assert!(
                matches!(layout.locate(bad), Err(ChunkSchemaError::InvalidArgument { .. })),
                "{} should fail",
                bad
            );
        }
    }
}
