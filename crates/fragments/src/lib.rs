//! Fragment store for BIM geometry.
//! Shapes are interned once in a shared pool and placed many times through
//! fragments; groups bundle the fragments of one model and round-trip through
//! the `.frag` format. The manager owns loaded groups, the bounding boxer
//! aggregates their extents, and the converter plus OBJ reader build groups
//! from raw geometry.

pub mod bounds;
pub mod codec;
pub mod convert;
pub mod error;
pub mod fragment;
pub mod group;
pub mod manager;
pub mod obj;
pub mod pool;
pub mod properties;
pub mod shape;

pub use bounds::{BoundingBoxer, PlacedMesh, WorldBounds};
pub use codec::{DecodedModel, ExportOptions, FILE_EXTENSION, decode};
pub use convert::{ConversionSettings, Converter, RawEntity, RawPlacement};
pub use error::{FragmentError, Result};
pub use fragment::{CategoryId, EntityId, Fragment, Instance};
pub use group::{FragmentGroup, FragmentId, GroupId};
pub use manager::{FragmentsManager, LoadObserver, ObserverId};
pub use obj::ObjModel;
pub use pool::{GeometryPool, Reservation, ShapeId, SharedPool};
pub use properties::{EntityProperties, PropertyTable, PropertyValue};
pub use shape::{MeshData, Shape, ShapeVertex};
