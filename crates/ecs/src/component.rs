use crate::error::EcsError;
use crate::geometry::Geometry;
use crate::shader::ShaderProgramSpec;
use glam::{Vec3, Vec4};
use glint_common::Transform;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Discriminant of every component the engine knows about.
///
/// The declaration order fixes `index()` and the mask bit of each kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ComponentKind {
    Transform,
    Model,
    Shader,
    Texture,
    FlatColor,
    MultiColor,
    BoxCollider,
    Motion,
}

impl ComponentKind {
    pub const COUNT: usize = 8;

    pub const ALL: [ComponentKind; Self::COUNT] = [
        Self::Transform,
        Self::Model,
        Self::Shader,
        Self::Texture,
        Self::FlatColor,
        Self::MultiColor,
        Self::BoxCollider,
        Self::Motion,
    ];

    /// Stable name used by lookups and diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::Transform => "Transform",
            Self::Model => "Model",
            Self::Shader => "Shader",
            Self::Texture => "Texture",
            Self::FlatColor => "FlatColor",
            Self::MultiColor => "MultiColor",
            Self::BoxCollider => "BoxCollider",
            Self::Motion => "Motion",
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    fn bit(self) -> u16 {
        1 << self.index()
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ComponentKind {
    type Err = EcsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.name() == s)
            .ok_or_else(|| EcsError::UnknownComponent(s.to_string()))
    }
}

/// Bit set of component kinds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ComponentMask(u16);

impl ComponentMask {
    pub const EMPTY: ComponentMask = ComponentMask(0);

    pub fn of(kinds: &[ComponentKind]) -> Self {
        kinds.iter().fold(Self::EMPTY, |mask, kind| mask.with(*kind))
    }

    pub fn with(self, kind: ComponentKind) -> Self {
        Self(self.0 | kind.bit())
    }

    pub fn insert(&mut self, kind: ComponentKind) {
        self.0 |= kind.bit();
    }

    pub fn remove(&mut self, kind: ComponentKind) {
        self.0 &= !kind.bit();
    }

    pub fn contains(self, kind: ComponentKind) -> bool {
        self.0 & kind.bit() != 0
    }

    pub fn contains_all(self, other: ComponentMask) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn kinds(self) -> impl Iterator<Item = ComponentKind> {
        ComponentKind::ALL
            .into_iter()
            .filter(move |kind| self.contains(*kind))
    }
}

/// Geometry reference. Entities sharing a model name share the same vertex layout.
#[derive(Debug, Clone)]
pub struct Model {
    pub name: String,
    pub geometry: Arc<Geometry>,
}

impl Model {
    pub fn new(name: impl Into<String>, geometry: Arc<Geometry>) -> Self {
        Self {
            name: name.into(),
            geometry,
        }
    }
}

/// Shared reference to the shader program an entity is drawn with.
#[derive(Debug, Clone)]
pub struct Shader {
    pub program: Arc<ShaderProgramSpec>,
}

impl Shader {
    pub fn new(program: Arc<ShaderProgramSpec>) -> Self {
        Self { program }
    }

    pub fn name(&self) -> &str {
        &self.program.name
    }
}

/// Cell (and span) of the texture atlas an entity samples from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Texture {
    pub column: u32,
    pub row: u32,
    pub column_span: u32,
    pub row_span: u32,
}

impl Texture {
    pub fn cell(column: u32, row: u32) -> Self {
        Self {
            column,
            row,
            column_span: 1,
            row_span: 1,
        }
    }

    pub fn with_span(mut self, column_span: u32, row_span: u32) -> Self {
        self.column_span = column_span;
        self.row_span = row_span;
        self
    }
}

impl Default for Texture {
    fn default() -> Self {
        Self::cell(0, 0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlatColor(pub Vec4);

impl Default for FlatColor {
    fn default() -> Self {
        Self(Vec4::ONE)
    }
}

/// One color per vertex, plus a cursor for cycling through the palette.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MultiColor {
    colors: Vec<Vec4>,
    index: usize,
}

impl MultiColor {
    pub fn new(colors: Vec<Vec4>) -> Self {
        Self { colors, index: 0 }
    }

    pub fn colors(&self) -> &[Vec4] {
        &self.colors
    }

    /// Returns the color under the cursor and advances it, wrapping at the end.
    /// An empty palette yields opaque white.
    pub fn next_color(&mut self) -> Vec4 {
        let Some(color) = self.colors.get(self.index).copied() else {
            return Vec4::ONE;
        };
        self.index = (self.index + 1) % self.colors.len();
        color
    }
}

/// Axis-aligned box collider. Unset half extents fall back to the transform scale.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BoxCollider {
    pub half_extents: Option<Vec3>,
}

impl BoxCollider {
    pub fn sized(half_extents: Vec3) -> Self {
        Self {
            half_extents: Some(half_extents),
        }
    }

    pub fn extents(&self, transform: &Transform) -> Vec3 {
        self.half_extents.unwrap_or(transform.scale).abs()
    }
}

/// Linear and angular motion integrated by the physics system.
///
/// Angular velocity is a scaled axis in radians per second.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Motion {
    pub velocity: Vec3,
    pub acceleration: Vec3,
    pub angular_velocity: Vec3,
}

impl Motion {
    pub fn with_velocity(velocity: Vec3) -> Self {
        Self {
            velocity,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub enum Component {
    Transform(Transform),
    Model(Model),
    Shader(Shader),
    Texture(Texture),
    FlatColor(FlatColor),
    MultiColor(MultiColor),
    BoxCollider(BoxCollider),
    Motion(Motion),
}

impl Component {
    pub fn kind(&self) -> ComponentKind {
        match self {
            Self::Transform(_) => ComponentKind::Transform,
            Self::Model(_) => ComponentKind::Model,
            Self::Shader(_) => ComponentKind::Shader,
            Self::Texture(_) => ComponentKind::Texture,
            Self::FlatColor(_) => ComponentKind::FlatColor,
            Self::MultiColor(_) => ComponentKind::MultiColor,
            Self::BoxCollider(_) => ComponentKind::BoxCollider,
            Self::Motion(_) => ComponentKind::Motion,
        }
    }
}

/// Typed access to one variant of [`Component`].
pub trait ComponentData: Into<Component> + Sized {
    const KIND: ComponentKind;

    fn from_component(component: &Component) -> Option<&Self>;
    fn from_component_mut(component: &mut Component) -> Option<&mut Self>;
}

macro_rules! component_data {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Component {
                fn from(value: $ty) -> Self {
                    Component::$variant(value)
                }
            }

            impl ComponentData for $ty {
                const KIND: ComponentKind = ComponentKind::$variant;

                fn from_component(component: &Component) -> Option<&Self> {
                    match component {
                        Component::$variant(value) => Some(value),
                        _ => None,
                    }
                }

                fn from_component_mut(component: &mut Component) -> Option<&mut Self> {
                    match component {
                        Component::$variant(value) => Some(value),
                        _ => None,
                    }
                }
            }
        )*
    };
}

component_data! {
    Transform => Transform,
    Model => Model,
    Shader => Shader,
    Texture => Texture,
    FlatColor => FlatColor,
    MultiColor => MultiColor,
    BoxCollider => BoxCollider,
    Motion => Motion,
}
