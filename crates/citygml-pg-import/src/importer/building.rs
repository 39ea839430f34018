//! Building importer.
//!
//! Imports a building with its building-part hierarchy, thematic boundary
//! surfaces, and address associations. Building parts are composed
//! sub-entities and traverse within the same pass; address associations
//! are either materialized inline or deferred through the reference
//! ledger when only an href is known.

use super::city_object::{
    double_or_null, id_or_null, import_city_object, int_or_null, text_or_null,
};
use super::{run_delegates, ImportContext};
use crate::error::{ImportError, Result};
use crate::model::{CityObject, FeatureClass, RefTarget};
use crate::target::{ParamType, SqlNullType, SqlValue, TableTarget};
use std::collections::VecDeque;

pub fn building_target(ctx: &ImportContext) -> TableTarget {
    TableTarget::new(
        &ctx.schema,
        "building",
        &[
            ("id", ParamType::I64),
            ("building_parent_id", ParamType::I64),
            ("building_root_id", ParamType::I64),
            ("measured_height", ParamType::F64),
            ("storeys_above_ground", ParamType::I32),
        ],
    )
}

pub fn thematic_surface_target(ctx: &ImportContext) -> TableTarget {
    TableTarget::new(
        &ctx.schema,
        "thematic_surface",
        &[
            ("id", ParamType::I64),
            ("objectclass_id", ParamType::I32),
            ("building_id", ParamType::I64),
            ("lod2_multi_surface", ParamType::Bytes),
        ],
    )
}

pub fn address_target(ctx: &ImportContext) -> TableTarget {
    TableTarget::new(
        &ctx.schema,
        "address",
        &[
            ("id", ParamType::I64),
            ("gmlid", ParamType::Text),
            ("street", ParamType::Text),
            ("house_number", ParamType::Text),
            ("zip_code", ParamType::Text),
            ("city", ParamType::Text),
            ("country", ParamType::Text),
            ("multi_point", ParamType::Bytes),
        ],
    )
}

pub fn address_to_building_target(ctx: &ImportContext) -> TableTarget {
    TableTarget::new(
        &ctx.schema,
        "address_to_building",
        &[
            ("building_id", ParamType::I64),
            ("address_id", ParamType::I64),
        ],
    )
}

/// Import a building and everything composed into it. Returns the
/// identity of the root building.
pub async fn import_building(ctx: &mut ImportContext, entity: &CityObject) -> Result<i64> {
    if entity.class != FeatureClass::Building {
        return Err(ImportError::classification(
            entity.label(),
            format!("expected a Building, got {}", entity.class.name()),
        ));
    }

    // Explicit worklist instead of recursion: building-part nesting has
    // no fixed depth.
    let mut queue: VecDeque<(&CityObject, Option<i64>, Option<i64>)> = VecDeque::new();
    queue.push_back((entity, None, None));
    let mut root_result = None;

    while let Some((node, parent_id, root_id)) = queue.pop_front() {
        let objectclass_id = match node.class.objectclass_id() {
            Some(id) => id,
            None => {
                return Err(ImportError::classification(
                    node.label(),
                    "building member has no object class",
                ))
            }
        };

        let id = import_city_object(ctx, node, objectclass_id).await?;
        let root_id = root_id.unwrap_or(id);
        if root_result.is_none() {
            root_result = Some(id);
        }

        let row = vec![
            SqlValue::I64(id),
            id_or_null(parent_id),
            SqlValue::I64(root_id),
            double_or_null(node.attr_double("measuredHeight")),
            int_or_null(node.attr_int("storeysAboveGround").map(|v| v as i32)),
        ];
        let target = building_target(ctx);
        ctx.writers.enqueue(&target, row).await?;

        for child in &node.children {
            if child.class == FeatureClass::BuildingPart {
                queue.push_back((child, Some(id), Some(root_id)));
            } else if child.class.is_thematic_surface() {
                import_thematic_surface(ctx, child, id).await?;
            } else {
                ctx.skip_or_abort(
                    &child.label(),
                    ImportError::unsupported(node.label(), child.class.name().to_string()),
                )?;
            }
        }

        for reference in &node.references {
            if reference.role != "address" {
                ctx.skip_or_abort(
                    &node.label(),
                    ImportError::unsupported(node.label(), format!("reference role {}", reference.role)),
                )?;
                continue;
            }
            match &reference.target {
                RefTarget::Inline(address) => {
                    // Check the payload class before touching any writer,
                    // so a bad reference never double-counts the building.
                    if address.class != FeatureClass::Address {
                        ctx.skip_or_abort(
                            &address.label(),
                            ImportError::unsupported(
                                node.label(),
                                format!("inline address of class {}", address.class.name()),
                            ),
                        )?;
                        continue;
                    }
                    let address_id = import_address(ctx, address).await?;
                    let target = address_to_building_target(ctx);
                    ctx.writers
                        .enqueue(&target, vec![SqlValue::I64(id), SqlValue::I64(address_id)])
                        .await?;
                }
                RefTarget::External(href) => {
                    ctx.ledger.register(crate::ledger::ForwardReference {
                        join_table: address_to_building_target(ctx),
                        source_id: id,
                        target_external_id: href.clone(),
                    });
                }
            }
        }

        run_delegates(ctx, node, id).await?;
    }

    // The root node is always processed first.
    root_result.ok_or_else(|| {
        ImportError::classification(entity.label(), "building produced no identity")
    })
}

/// Import one thematic boundary surface of a building.
async fn import_thematic_surface(
    ctx: &mut ImportContext,
    surface: &CityObject,
    building_id: i64,
) -> Result<i64> {
    let objectclass_id = match surface.class.objectclass_id() {
        Some(id) => id,
        None => {
            return Err(ImportError::classification(
                surface.label(),
                "thematic surface has no object class",
            ))
        }
    };

    let id = import_city_object(ctx, surface, objectclass_id).await?;

    let geometry = match &surface.geometry {
        Some(value) => {
            let converter = ctx.converter.clone();
            converter.convert(value, ctx.srid)?
        }
        None => SqlValue::Null(SqlNullType::Bytes),
    };

    let row = vec![
        SqlValue::I64(id),
        SqlValue::I32(objectclass_id),
        SqlValue::I64(building_id),
        geometry,
    ];
    let target = thematic_surface_target(ctx);
    ctx.writers.enqueue(&target, row).await?;

    run_delegates(ctx, surface, id).await?;
    Ok(id)
}

/// Import an address entity. Addresses are not city objects; they own
/// their row directly and share the run's identity sequence.
pub async fn import_address(ctx: &mut ImportContext, entity: &CityObject) -> Result<i64> {
    if entity.class != FeatureClass::Address {
        return Err(ImportError::classification(
            entity.label(),
            format!("expected an Address, got {}", entity.class.name()),
        ));
    }

    let id = ctx.allocate_id();
    if let Some(gml_id) = &entity.gml_id {
        ctx.record_external_id(gml_id, id);
    }

    let multi_point = match &entity.geometry {
        Some(value) => {
            let converter = ctx.converter.clone();
            converter.convert(value, ctx.srid)?
        }
        None => SqlValue::Null(SqlNullType::Bytes),
    };

    let row = vec![
        SqlValue::I64(id),
        text_or_null(entity.gml_id.as_deref()),
        text_or_null(entity.attr_text("street")),
        text_or_null(entity.attr_text("houseNumber")),
        text_or_null(entity.attr_text("zipCode")),
        text_or_null(entity.attr_text("city")),
        text_or_null(entity.attr_text("country")),
        multi_point,
    ];
    let target = address_target(ctx);
    ctx.writers.enqueue(&target, row).await?;
    ctx.stats.imported += 1;

    run_delegates(ctx, entity, id).await?;
    Ok(id)
}
