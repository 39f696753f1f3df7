//! The renderer facade (component I): the narrow contract the frame
//! composer drives. The actual GPU backend — shader compilation, command
//! submission, texture upload — is an external collaborator (§1); this
//! crate only needs the interface.

/// Upload/draw contract consumed by the composer. Implementations propagate
/// errors rather than panicking; the composer only calls `upload_mesh` when
/// the combined buffers actually changed.
pub trait Renderer {
    type Error: std::error::Error + Send + Sync + 'static;

    fn create_pipeline(&mut self, shader_source: &str, vertex_entry: &str, fragment_entry: &str, vertex_stride: usize) -> Result<(), Self::Error>;
    fn set_texture(&mut self, data: &[u8], width: u32, height: u32, row_bytes: u32) -> Result<(), Self::Error>;
    fn upload_mesh(&mut self, vertex_bytes: &[u8], stride: usize, indices: &[u32]) -> Result<(), Self::Error>;
    fn set_line_mesh(&mut self, bytes: &[u8], stride: usize) -> Result<(), Self::Error>;
    fn set_ui_mesh(&mut self, bytes: &[u8], stride: usize) -> Result<(), Self::Error>;
    fn set_uniforms(&mut self, bytes: &[u8]) -> Result<(), Self::Error>;
    fn draw(&mut self, clear_color: [f32; 4]) -> Result<(), Self::Error>;
}

/// A `Renderer` that performs no GPU work, for headless profiling and tests.
/// Records call counts so tests can assert the composer only re-uploads
/// when its combined buffers actually change.
#[derive(Debug, Default)]
pub struct NullRenderer {
    pub pipelines_created: usize,
    pub textures_set: usize,
    pub meshes_uploaded: usize,
    pub draws: usize,
    pub last_vertex_bytes: usize,
    pub last_index_count: usize,
}

#[derive(Debug, thiserror::Error)]
#[error("null renderer error (unreachable)")]
pub struct NullRendererError;

impl Renderer for NullRenderer {
    type Error = NullRendererError;

    fn create_pipeline(&mut self, _shader_source: &str, _vertex_entry: &str, _fragment_entry: &str, _vertex_stride: usize) -> Result<(), Self::Error> {
        self.pipelines_created += 1;
        Ok(())
    }

    fn set_texture(&mut self, _data: &[u8], _width: u32, _height: u32, _row_bytes: u32) -> Result<(), Self::Error> {
        self.textures_set += 1;
        Ok(())
    }

    fn upload_mesh(&mut self, vertex_bytes: &[u8], _stride: usize, indices: &[u32]) -> Result<(), Self::Error> {
        self.meshes_uploaded += 1;
        self.last_vertex_bytes = vertex_bytes.len();
        self.last_index_count = indices.len();
        Ok(())
    }

    fn set_line_mesh(&mut self, _bytes: &[u8], _stride: usize) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_ui_mesh(&mut self, _bytes: &[u8], _stride: usize) -> Result<(), Self::Error> {
        Ok(())
    }

    fn set_uniforms(&mut self, _bytes: &[u8]) -> Result<(), Self::Error> {
        Ok(())
    }

    fn draw(&mut self, _clear_color: [f32; 4]) -> Result<(), Self::Error> {
        self.draws += 1;
        Ok(())
    }
}
