use std::f32::consts::TAU;

use serde::Serialize;

use super::{Color, FrameContext, FrameRng, Renderer, VisualFlag};
use crate::{
    assets::AssetStore,
    host::Viewport,
    mapping::Intensities,
    scene::{SceneDescriptor, SceneInstance, ShadingMode},
};

const SHOCKWAVE_SECONDS: f32 = 0.8;

/// Everything a GPU backend uploads for one frame of a viewer scene.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneUniforms {
    pub time: f32,
    pub progress: f32,
    pub camera_eye: [f32; 3],
    pub aspect: f32,
    pub fov_degrees: f32,
    pub mesh_rotation: f32,
    pub displacement: f32,
    pub particle_count: u32,
    pub shading: ShadingMode,
    pub textured: bool,
    pub bloom: f32,
    pub chromatic_aberration: f32,
    pub afterimage: f32,
    /// Radius of the expanding shockwave ring, 0 when none is running.
    pub shockwave: f32,
    pub tint: Color,
    pub tint_strength: f32,
}

/// 3D viewer: an auto-orbiting camera around a displaced, spinning mesh.
#[derive(Debug, Clone)]
pub struct OrbitRenderer {
    scene: SceneInstance,
    textured: bool,
    uniforms: SceneUniforms,
    alarm: bool,
    strobe: bool,
    flash: Option<(Color, f32, f32)>,
    shockwave: Option<f32>,
    frames: u64,
}

impl OrbitRenderer {
    pub fn new(descriptor: SceneDescriptor, assets: &AssetStore) -> Self {
        let resolved = assets.resolve_scene_assets(&descriptor);
        let textured = resolved.textured();
        if !textured {
            tracing::debug!(scene = %descriptor.name, "rendering scene untextured");
        }
        let scene = SceneInstance::new(descriptor);
        let uniforms = SceneUniforms {
            time: 0.0,
            progress: 0.0,
            camera_eye: scene.camera.eye(),
            aspect: scene.camera.aspect,
            fov_degrees: scene.camera.fov_degrees,
            mesh_rotation: 0.0,
            displacement: 0.0,
            particle_count: 0,
            shading: scene.descriptor.shading,
            textured,
            bloom: 0.0,
            chromatic_aberration: 0.0,
            afterimage: 0.0,
            shockwave: 0.0,
            tint: Color::WHITE,
            tint_strength: 0.0,
        };
        Self {
            scene,
            textured,
            uniforms,
            alarm: false,
            strobe: false,
            flash: None,
            shockwave: None,
            frames: 0,
        }
    }

    pub fn uniforms(&self) -> &SceneUniforms {
        &self.uniforms
    }

    pub fn scene(&self) -> &SceneInstance {
        &self.scene
    }

    fn write_uniforms(&mut self, time: f32, progress: f32) {
        let post = self.scene.descriptor.post;
        let glow = self.scene.glow;
        let u = &mut self.uniforms;
        u.time = time;
        u.progress = progress;
        u.camera_eye = self.scene.camera.eye();
        u.aspect = self.scene.camera.aspect;
        u.fov_degrees = self.scene.camera.fov_degrees;
        u.mesh_rotation = self.scene.rotation;
        u.displacement = self.scene.displacement;
        u.particle_count = self.scene.particles;
        u.textured = self.textured;
        u.bloom = post.bloom * glow;
        u.chromatic_aberration = post.chromatic_aberration * glow;
        u.afterimage = post.afterimage * glow;
    }
}

impl Renderer for OrbitRenderer {
    fn resize(&mut self, viewport: Viewport) {
        self.scene.camera.set_aspect(viewport.aspect());
        self.uniforms.aspect = self.scene.camera.aspect;
    }

    fn render(&mut self, frame: &FrameContext, intensities: &Intensities, _rng: &mut FrameRng) {
        let dt = frame.delta.as_secs_f32();
        let time = frame.elapsed.as_secs_f32();
        self.frames += 1;
        self.scene.apply(intensities, dt);
        self.write_uniforms(time, frame.progress.value());

        self.uniforms.shockwave = match self.shockwave.as_mut() {
            Some(age) => {
                *age += dt;
                let t = *age / SHOCKWAVE_SECONDS;
                if t >= 1.0 {
                    self.shockwave = None;
                    0.0
                } else {
                    t * self.scene.descriptor.swarm.radius * 2.0
                }
            }
            None => 0.0,
        };

        let (tint, strength) = if let Some((color, seconds, age)) = self.flash.as_mut() {
            *age += dt;
            let strength = if *seconds <= 0.0 { 1.0 } else { (*age / *seconds).min(1.0) };
            (*color, strength)
        } else if self.strobe && frame.frame_index % 2 == 0 {
            (Color::WHITE, 0.6)
        } else if self.alarm {
            (Color::ALARM_RED, 0.25 + 0.25 * (time * 2.0 * TAU).sin())
        } else {
            (Color::WHITE, 0.0)
        };
        self.uniforms.tint = tint;
        self.uniforms.tint_strength = strength;
    }

    fn apply_flag(&mut self, flag: VisualFlag) {
        match flag {
            VisualFlag::Alarm => self.alarm = true,
            VisualFlag::Strobe => self.strobe = true,
            VisualFlag::Flash { color, seconds } => {
                self.flash = Some((color, seconds.max(0.0), 0.0))
            }
            VisualFlag::Shockwave => self.shockwave = Some(0.0),
            VisualFlag::Calm => {
                self.alarm = false;
                self.strobe = false;
                self.flash = None;
                self.shockwave = None;
            }
        }
    }

    fn render_end_state(&mut self) {
        self.apply_flag(VisualFlag::Calm);
        self.scene.settle();
        let (time, progress) = (self.uniforms.time, 1.0);
        self.write_uniforms(time, progress);
        self.uniforms.shockwave = 0.0;
        self.uniforms.tint_strength = 0.0;
    }

    fn frames_rendered(&self) -> u64 {
        self.frames
    }
}
