//! Upstream shader generation interface.

use super::uid::{PrimitiveTopology, ShaderUid};

/// Derives stage UIDs from graphics state and generates source on demand.
///
/// Implemented by the embedding renderer. Every method must be a pure
/// function of `state`: equal UIDs must always yield identical source.
pub trait ShaderGenerator: Send + Sync + 'static {
    /// Snapshot of the graphics state the shaders are generated from.
    type State: ?Sized;
    type GeometryUid: ShaderUid;
    type PixelUid: ShaderUid;
    type VertexUid: ShaderUid;

    fn geometry_uid(&self, state: &Self::State) -> Self::GeometryUid;
    fn pixel_uid(&self, state: &Self::State) -> Self::PixelUid;
    fn vertex_uid(&self, state: &Self::State) -> Self::VertexUid;

    fn generate_geometry_source(&self, state: &Self::State) -> String;
    fn generate_pixel_source(&self, state: &Self::State) -> String;
    fn generate_vertex_source(&self, state: &Self::State) -> String;

    /// Primitive class of the draw described by `state`.
    fn primitive_topology(&self, _state: &Self::State) -> PrimitiveTopology {
        PrimitiveTopology::Triangle
    }
}
