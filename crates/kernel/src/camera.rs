use glam::{Mat4, Vec3};
use glint_common::{Dimension, Viewport};
use glint_ecs::EntityId;
use glint_render::RenderContext;

/// Entity a camera tracks. Only the position is followed.
#[derive(Debug, Clone, PartialEq)]
pub struct Follow {
    pub manager: String,
    pub entity: EntityId,
    pub offset: Vec3,
}

/// View onto one or more entity managers.
///
/// `D` picks the projection: [`Dim2`](glint_common::Dim2) cameras are
/// orthographic in pixel units, [`Dim3`](glint_common::Dim3) cameras use a
/// perspective projection.
#[derive(Debug, Clone)]
pub struct Camera<D: Dimension> {
    name: String,
    pub position: D::Vector,
    pub rotation: D::Rotation,
    pub zoom: f32,
    viewport: Viewport,
    follow: Option<Follow>,
}

impl<D: Dimension> Camera<D> {
    pub fn new(name: impl Into<String>, viewport: Viewport) -> Self {
        Self {
            name: name.into(),
            position: D::Vector::default(),
            rotation: D::identity_rotation(),
            zoom: 1.0,
            viewport,
            follow: None,
        }
    }

    pub fn at(mut self, position: D::Vector) -> Self {
        self.position = position;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn view(&self) -> Mat4 {
        Mat4::from_rotation_translation(D::to_quat(self.rotation), D::to_vec3(self.position)).inverse()
    }

    pub fn projection(&self) -> Mat4 {
        D::projection(self.viewport, self.zoom)
    }

    /// Render context for this camera at `elapsed_ms` since the game started.
    pub fn context(&self, elapsed_ms: f32) -> RenderContext {
        RenderContext {
            projection: self.projection(),
            view: self.view(),
            texture_unit: None,
            viewport: self.viewport,
            elapsed_ms,
        }
    }

    pub fn follow(&mut self, manager: impl Into<String>, entity: EntityId, offset: Vec3) {
        self.follow = Some(Follow {
            manager: manager.into(),
            entity,
            offset,
        });
    }

    pub fn unfollow(&mut self) {
        self.follow = None;
    }

    pub fn following(&self) -> Option<&Follow> {
        self.follow.as_ref()
    }

    /// Moves the camera onto the followed entity's position plus offset.
    pub fn update_follow(&mut self, target: Vec3) {
        if let Some(follow) = &self.follow {
            self.position = D::from_vec3(target + follow.offset);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::{Quat, Vec2};
    use glint_common::{Dim2, Dim3};

    #[test]
    fn view_moves_world_opposite_to_camera() {
        let cam = Camera::<Dim2>::new("main", Viewport::new(800, 600)).at(Vec2::new(100.0, 50.0));
        let p = cam.view().transform_point3(Vec3::new(100.0, 50.0, 0.0));
        assert!(p.length() < 1e-5);
    }

    #[test]
    fn context_carries_matrices() {
        let cam = Camera::<Dim2>::new("ui", Viewport::new(640, 480));
        let ctx = cam.context(250.0);
        assert_eq!(ctx.projection, cam.projection());
        assert_eq!(ctx.view, Mat4::IDENTITY);
        assert_eq!(ctx.viewport, Viewport::new(640, 480));
        assert_eq!(ctx.elapsed_ms, 250.0);
    }

    #[test]
    fn follow_tracks_position_only() {
        let mut cam = Camera::<Dim3>::new("main", Viewport::default());
        cam.rotation = Quat::from_rotation_y(0.5);
        cam.update_follow(Vec3::ONE);
        assert_eq!(cam.position, Vec3::ZERO);

        cam.follow("world", EntityId::new(), Vec3::new(0.0, 0.0, 10.0));
        cam.update_follow(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(cam.position, Vec3::new(1.0, 2.0, 13.0));
        assert_eq!(cam.rotation, Quat::from_rotation_y(0.5));

        cam.unfollow();
        assert!(cam.following().is_none());
    }

    #[test]
    fn zoom_changes_projection() {
        let mut cam = Camera::<Dim2>::new("main", Viewport::new(800, 600));
        let before = cam.projection();
        cam.zoom = 2.0;
        assert_ne!(before, cam.projection());
    }
}
