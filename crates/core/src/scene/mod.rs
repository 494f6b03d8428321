use std::f32::consts::TAU;

use serde::{Deserialize, Serialize};

use crate::mapping::Intensities;

/// Geometry shown at the centre of a viewer scene.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mesh", rename_all = "snake_case")]
pub enum MeshKind {
    Icosahedron { detail: u32 },
    TorusKnot { p: u32, q: u32 },
    Crystal,
    /// Model loaded from a registered asset URL.
    Stl { asset: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShadingMode {
    Mesh,
    Wireframe,
    PointCloud,
}

/// Camera that circles the origin on its own. Passive: no user input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrbitCamera {
    pub distance: f32,
    pub height: f32,
    /// Radians per second.
    pub speed: f32,
    pub fov_degrees: f32,
    pub aspect: f32,
    pub azimuth: f32,
}

impl Default for OrbitCamera {
    fn default() -> Self {
        Self {
            distance: 4.0,
            height: 1.2,
            speed: 0.35,
            fov_degrees: 45.0,
            aspect: 16.0 / 9.0,
            azimuth: 0.0,
        }
    }
}

impl OrbitCamera {
    pub fn advance(&mut self, dt: f32) {
        self.azimuth = (self.azimuth + self.speed * dt).rem_euclid(TAU);
    }

    pub fn set_aspect(&mut self, aspect: f32) {
        if aspect.is_finite() && aspect > 0.0 {
            self.aspect = aspect;
        }
    }

    pub fn eye(&self) -> [f32; 3] {
        [
            self.distance * self.azimuth.cos(),
            self.height,
            self.distance * self.azimuth.sin(),
        ]
    }
}

/// Instanced particles around the mesh.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParticleSwarm {
    pub max_count: u32,
    pub radius: f32,
}

impl ParticleSwarm {
    pub fn count_for(&self, spawn_rate: f32) -> u32 {
        (self.max_count as f32 * spawn_rate.clamp(0.0, 1.0)).round() as u32
    }
}

/// Strength ceilings for the post-process passes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PostStack {
    pub bloom: f32,
    pub chromatic_aberration: f32,
    pub afterimage: f32,
}

impl Default for PostStack {
    fn default() -> Self {
        Self {
            bloom: 1.2,
            chromatic_aberration: 0.004,
            afterimage: 0.85,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneDescriptor {
    pub name: String,
    pub mesh: MeshKind,
    pub shading: ShadingMode,
    /// Surface texture URL.
    pub texture: Option<String>,
    /// HDR environment URL.
    pub environment: Option<String>,
    pub camera: OrbitCamera,
    pub swarm: ParticleSwarm,
    pub post: PostStack,
    /// Peak vertex displacement in world units.
    pub max_displacement: f32,
    /// Mesh spin at full rotation intensity, radians per second.
    pub max_spin: f32,
}

impl SceneDescriptor {
    pub fn reveal_viewer() -> Self {
        Self {
            name: "Reveal Viewer".to_string(),
            mesh: MeshKind::Icosahedron { detail: 3 },
            shading: ShadingMode::Mesh,
            texture: Some("textures/relic-albedo.png".to_string()),
            environment: Some("hdr/vault.hdr".to_string()),
            camera: OrbitCamera::default(),
            swarm: ParticleSwarm {
                max_count: 2_000,
                radius: 2.5,
            },
            post: PostStack::default(),
            max_displacement: 0.35,
            max_spin: 1.5,
        }
    }
}

/// Live state of a scene for one sequence run.
#[derive(Debug, Clone)]
pub struct SceneInstance {
    pub descriptor: SceneDescriptor,
    pub camera: OrbitCamera,
    pub rotation: f32,
    pub displacement: f32,
    pub particles: u32,
    pub glow: f32,
}

impl SceneInstance {
    pub fn new(descriptor: SceneDescriptor) -> Self {
        Self {
            camera: descriptor.camera,
            descriptor,
            rotation: 0.0,
            displacement: 0.0,
            particles: 0,
            glow: 0.0,
        }
    }

    /// Steps the camera and mesh by `dt` and pulls this frame's intensities
    /// into the scene.
    pub fn apply(&mut self, intensities: &Intensities, dt: f32) {
        self.camera.advance(dt);
        let spin = self.descriptor.max_spin * intensities.rotation.clamp(0.0, 1.0);
        self.rotation = (self.rotation + spin * dt).rem_euclid(TAU);
        self.displacement =
            self.descriptor.max_displacement * intensities.displacement.clamp(0.0, 1.0);
        self.particles = self.descriptor.swarm.count_for(intensities.spawn_rate);
        self.glow = intensities.glow.clamp(0.0, 1.0);
    }

    /// Resting pose: no displacement or particles, camera keeps orbiting.
    pub fn settle(&mut self) {
        self.displacement = 0.0;
        self.particles = 0;
        self.glow = 0.5;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn camera_orbits_and_wraps() {
        let mut camera = OrbitCamera {
            speed: TAU,
            ..OrbitCamera::default()
        };
        camera.advance(0.25);
        let eye = camera.eye();
        assert!(eye[0].abs() < 1e-4);
        assert!((eye[2] - camera.distance).abs() < 1e-4);

        camera.advance(1.0);
        assert!(camera.azimuth < TAU);
    }

    #[test]
    fn aspect_ignores_degenerate_values() {
        let mut camera = OrbitCamera::default();
        camera.set_aspect(0.0);
        camera.set_aspect(f32::NAN);
        assert!((camera.aspect - 16.0 / 9.0).abs() < 1e-6);
        camera.set_aspect(2.0);
        assert_eq!(camera.aspect, 2.0);
    }

    #[test]
    fn intensities_drive_the_instance() {
        let mut scene = SceneInstance::new(SceneDescriptor::reveal_viewer());
        let intensities = Intensities {
            displacement: 0.5,
            spawn_rate: 0.25,
            rotation: 1.0,
            ..Intensities::default()
        };
        scene.apply(&intensities, 0.1);

        assert!((scene.displacement - 0.175).abs() < 1e-6);
        assert_eq!(scene.particles, 500);
        assert!(scene.rotation > 0.0);

        scene.settle();
        assert_eq!(scene.particles, 0);
    }

    #[test]
    fn descriptor_loads_from_json() {
        let json = serde_json::to_string(&SceneDescriptor::reveal_viewer()).unwrap();
        let scene: SceneDescriptor = serde_json::from_str(&json).unwrap();
        assert_eq!(scene.mesh, MeshKind::Icosahedron { detail: 3 });
        assert_eq!(scene.shading, ShadingMode::Mesh);
    }
}
