//! Rotating quad game unit

use std::time::Duration;

use nalgebra::{Matrix4, Point3, Vector3};
use vk_session::prelude::*;

/// Corner positions and colors, counter-clockwise seen from +z
pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex::new([-0.5, -0.5, 0.0], [1.0, 0.0, 0.0]),
    Vertex::new([0.5, -0.5, 0.0], [0.0, 1.0, 0.0]),
    Vertex::new([0.5, 0.5, 0.0], [0.0, 0.0, 1.0]),
    Vertex::new([-0.5, 0.5, 0.0], [1.0, 1.0, 1.0]),
];

/// Two triangles sharing the 0-2 diagonal
pub const QUAD_INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

/// Radians per second
const SPIN_RATE: f32 = std::f32::consts::FRAC_PI_2;

/// Uniform block at binding 0 of `quad.vert`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transforms {
    /// Object to world
    pub model: [[f32; 4]; 4],
    /// World to camera
    pub view: [[f32; 4]; 4],
    /// Camera to clip, y flipped for Vulkan
    pub proj: [[f32; 4]; 4],
}

unsafe impl bytemuck::Pod for Transforms {}
unsafe impl bytemuck::Zeroable for Transforms {}

impl Transforms {
    /// Transforms after `elapsed` seconds of rotation for a drawable of `aspect` width/height
    pub fn at(elapsed: f32, aspect: f32) -> Self {
        let model = Matrix4::from_axis_angle(&Vector3::z_axis(), elapsed * SPIN_RATE);
        let view = Matrix4::look_at_rh(
            &Point3::new(2.0, 2.0, 2.0),
            &Point3::origin(),
            &Vector3::z(),
        );
        let mut proj = Matrix4::new_perspective(aspect, 45f32.to_radians(), 0.1, 10.0);
        proj[(1, 1)] *= -1.0;

        Self { model: model.into(), view: view.into(), proj: proj.into() }
    }
}

fn aspect_ratio((width, height): (u32, u32)) -> f32 {
    if width == 0 || height == 0 {
        1.0
    } else {
        width as f32 / height as f32
    }
}

/// Spins a colored quad until Escape or the window closes
#[derive(Default)]
pub struct QuadGame {
    mesh: Option<Mesh>,
    elapsed: Duration,
    paused: bool,
    closed: bool,
}

impl QuadGame {
    /// Game with no GPU resources yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Rotation time accumulated so far
    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    /// Whether Space has frozen the rotation
    pub fn is_paused(&self) -> bool {
        self.paused
    }
}

impl Game for QuadGame {
    fn initialize(&mut self, ctx: &mut dyn GameContext) -> Result<(), GameError> {
        self.mesh = Some(ctx.create_mesh("quad", &QUAD_VERTICES, Some(&QUAD_INDICES))?);
        log::debug!("Quad game initialized at {:?}", ctx.drawable_extent());
        Ok(())
    }

    fn process_input(&mut self, event: &InputEvent) {
        match event {
            InputEvent::CloseRequested | InputEvent::KeyPressed(KeyCode::Escape) => self.closed = true,
            InputEvent::KeyPressed(KeyCode::Space) => self.paused = !self.paused,
            _ => {}
        }
    }

    fn update(&mut self, dt: Duration) {
        if !self.paused {
            self.elapsed += dt;
        }
    }

    fn draw(&self, ctx: &mut dyn GameContext) -> VulkanResult<FrameOutcome> {
        let Some(mesh) = self.mesh.as_ref() else {
            return Ok(FrameOutcome::Skipped);
        };
        let transforms = Transforms::at(self.elapsed.as_secs_f32(), aspect_ratio(ctx.drawable_extent()));
        ctx.draw_frame(mesh, bytemuck::bytes_of(&transforms))
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Entry point looked up by the session's dynamic game loader
#[no_mangle]
pub fn create_game() -> Box<dyn Game> {
    Box::new(QuadGame::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Vector4;

    #[test]
    fn test_uniform_block_matches_shader_size() {
        assert_eq!(std::mem::size_of::<Transforms>(), 192);
        assert_eq!(bytemuck::bytes_of(&Transforms::at(0.0, 1.0)).len(), 192);
    }

    #[test]
    fn test_model_rotates_about_z() {
        let start = Matrix4::from(Transforms::at(0.0, 1.0).model);
        assert_relative_eq!(start, Matrix4::identity(), epsilon = 1e-6);

        // One second is a quarter turn: +x maps to +y
        let turned = Matrix4::from(Transforms::at(1.0, 1.0).model);
        let x = turned * Vector4::new(1.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(x, Vector4::new(0.0, 1.0, 0.0, 1.0), epsilon = 1e-6);
    }

    #[test]
    fn test_view_puts_origin_in_front_of_camera() {
        let view = Matrix4::from(Transforms::at(0.0, 1.0).view);
        let origin = view * Vector4::new(0.0, 0.0, 0.0, 1.0);
        assert_relative_eq!(origin.x, 0.0, epsilon = 1e-6);
        assert_relative_eq!(origin.y, 0.0, epsilon = 1e-6);
        assert_relative_eq!(origin.z, -(12f32).sqrt(), epsilon = 1e-5);
    }

    #[test]
    fn test_projection_flips_y_and_uses_aspect() {
        let proj = Transforms::at(0.0, 2.0).proj;
        let focal = 1.0 / (45f32.to_radians() / 2.0).tan();
        // Column-major: proj[column][row]
        assert_relative_eq!(proj[1][1], -focal, epsilon = 1e-5);
        assert_relative_eq!(proj[0][0], focal / 2.0, epsilon = 1e-5);
    }

    #[test]
    fn test_aspect_ratio_guards_empty_drawable() {
        assert_relative_eq!(aspect_ratio((800, 600)), 800.0 / 600.0);
        assert_relative_eq!(aspect_ratio((0, 600)), 1.0);
    }

    #[test]
    fn test_input_closes_and_pauses() {
        let mut game = QuadGame::new();
        game.update(Duration::from_millis(250));
        game.process_input(&InputEvent::KeyPressed(KeyCode::Space));
        assert!(game.is_paused());
        game.update(Duration::from_millis(250));
        assert_eq!(game.elapsed(), Duration::from_millis(250));

        assert!(!game.is_closed());
        game.process_input(&InputEvent::KeyPressed(KeyCode::Escape));
        assert!(game.is_closed());

        let mut game = QuadGame::new();
        game.process_input(&InputEvent::CloseRequested);
        assert!(game.is_closed());
    }

    #[test]
    fn test_indices_reference_every_vertex() {
        for vertex in 0..QUAD_VERTICES.len() as u16 {
            assert!(QUAD_INDICES.contains(&vertex));
        }
    }
}
