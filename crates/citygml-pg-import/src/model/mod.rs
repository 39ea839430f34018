//! In-memory city model entities, as handed over by the parser.
//!
//! This crate never parses source documents. The upstream parser produces
//! [`CityObject`] trees: each node carries a feature classification, flat
//! attributes, optional geometry, composed children, and associations that
//! are either materialized inline or carry only an external identifier.

use crate::geometry::GeometryValue;
use std::collections::BTreeMap;

/// Feature classification of a city model entity.
///
/// Variants map to the object class registry of the relational schema;
/// [`FeatureClass::Unknown`] covers source types with no table mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureClass {
    Building,
    BuildingPart,
    RoofSurface,
    WallSurface,
    GroundSurface,
    ReliefFeature,
    TinRelief,
    MassPointRelief,
    RasterRelief,
    Address,
    Unknown(String),
}

impl FeatureClass {
    /// Numeric object class identifier, where the schema registers one.
    pub fn objectclass_id(&self) -> Option<i32> {
        match self {
            FeatureClass::ReliefFeature => Some(14),
            FeatureClass::TinRelief => Some(16),
            FeatureClass::MassPointRelief => Some(17),
            FeatureClass::RasterRelief => Some(19),
            FeatureClass::BuildingPart => Some(25),
            FeatureClass::Building => Some(26),
            FeatureClass::RoofSurface => Some(33),
            FeatureClass::WallSurface => Some(34),
            FeatureClass::GroundSurface => Some(35),
            FeatureClass::Address | FeatureClass::Unknown(_) => None,
        }
    }

    /// Short display name used in logs and error messages.
    pub fn name(&self) -> &str {
        match self {
            FeatureClass::Building => "Building",
            FeatureClass::BuildingPart => "BuildingPart",
            FeatureClass::RoofSurface => "RoofSurface",
            FeatureClass::WallSurface => "WallSurface",
            FeatureClass::GroundSurface => "GroundSurface",
            FeatureClass::ReliefFeature => "ReliefFeature",
            FeatureClass::TinRelief => "TinRelief",
            FeatureClass::MassPointRelief => "MassPointRelief",
            FeatureClass::RasterRelief => "RasterRelief",
            FeatureClass::Address => "Address",
            FeatureClass::Unknown(name) => name,
        }
    }

    /// Whether this class is a thematic boundary surface of a building.
    pub fn is_thematic_surface(&self) -> bool {
        matches!(
            self,
            FeatureClass::RoofSurface | FeatureClass::WallSurface | FeatureClass::GroundSurface
        )
    }
}

/// A typed attribute value on a city object.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Text(String),
    Int(i64),
    Double(f64),
}

/// Association from one entity to another, by role.
#[derive(Debug, Clone)]
pub struct EntityRef {
    /// Relationship role, e.g. "address" or "reliefComponent".
    pub role: String,

    /// Inline target or external identifier.
    pub target: RefTarget,
}

/// Target of an association.
#[derive(Debug, Clone)]
pub enum RefTarget {
    /// The full target entity travels inline with the reference.
    Inline(Box<CityObject>),

    /// Only the target's external identifier is known ("href"). The
    /// target may not have been imported yet, or may never appear.
    External(String),
}

/// One node of the parsed city model graph.
#[derive(Debug, Clone)]
pub struct CityObject {
    /// Feature classification.
    pub class: FeatureClass,

    /// External identifier (gml id), if the source carries one.
    pub gml_id: Option<String>,

    /// Codespace qualifying the external identifier.
    pub gml_id_codespace: Option<String>,

    /// Flat attributes keyed by source attribute name.
    pub attributes: BTreeMap<String, AttributeValue>,

    /// Geometry payload, already lifted to a generic value by the parser.
    pub geometry: Option<GeometryValue>,

    /// Composed sub-entities. Always imported in the same pass.
    pub children: Vec<CityObject>,

    /// Associations, inline or external-identifier-only.
    pub references: Vec<EntityRef>,
}

impl CityObject {
    /// Create an empty entity of the given class.
    pub fn new(class: FeatureClass) -> Self {
        Self {
            class,
            gml_id: None,
            gml_id_codespace: None,
            attributes: BTreeMap::new(),
            geometry: None,
            children: Vec::new(),
            references: Vec::new(),
        }
    }

    /// Set the external identifier.
    pub fn with_gml_id(mut self, gml_id: impl Into<String>) -> Self {
        self.gml_id = Some(gml_id.into());
        self
    }

    /// Attach an attribute.
    pub fn with_attribute(mut self, name: impl Into<String>, value: AttributeValue) -> Self {
        self.attributes.insert(name.into(), value);
        self
    }

    /// Attach a geometry payload.
    pub fn with_geometry(mut self, geometry: GeometryValue) -> Self {
        self.geometry = Some(geometry);
        self
    }

    /// Attach a composed child.
    pub fn with_child(mut self, child: CityObject) -> Self {
        self.children.push(child);
        self
    }

    /// Attach an inline association.
    pub fn with_inline_ref(mut self, role: impl Into<String>, target: CityObject) -> Self {
        self.references.push(EntityRef {
            role: role.into(),
            target: RefTarget::Inline(Box::new(target)),
        });
        self
    }

    /// Attach an external-identifier-only association.
    pub fn with_external_ref(mut self, role: impl Into<String>, href: impl Into<String>) -> Self {
        self.references.push(EntityRef {
            role: role.into(),
            target: RefTarget::External(href.into()),
        });
        self
    }

    /// Text attribute accessor.
    pub fn attr_text(&self, name: &str) -> Option<&str> {
        match self.attributes.get(name) {
            Some(AttributeValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Integer attribute accessor.
    pub fn attr_int(&self, name: &str) -> Option<i64> {
        match self.attributes.get(name) {
            Some(AttributeValue::Int(v)) => Some(*v),
            _ => None,
        }
    }

    /// Double attribute accessor. Integer attributes widen to double.
    pub fn attr_double(&self, name: &str) -> Option<f64> {
        match self.attributes.get(name) {
            Some(AttributeValue::Double(v)) => Some(*v),
            Some(AttributeValue::Int(v)) => Some(*v as f64),
            _ => None,
        }
    }

    /// Label used in logs: gml id when present, class name otherwise.
    pub fn label(&self) -> String {
        match &self.gml_id {
            Some(id) => format!("{} '{}'", self.class.name(), id),
            None => format!("anonymous {}", self.class.name()),
        }
    }
}
