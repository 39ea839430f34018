//! Relief (terrain) importer.
//!
//! Imports a relief feature and its components. TIN and mass-point
//! components are representable in the target schema; raster components
//! are not and fall under the run policy. Components referenced only by
//! href are deferred through the reference ledger.

use super::city_object::{double_or_null, import_city_object};
use super::{run_delegates, ImportContext};
use crate::error::{ImportError, Result};
use crate::ledger::ForwardReference;
use crate::model::{CityObject, FeatureClass, RefTarget};
use crate::schema::SchemaFeature;
use crate::target::{ParamType, SqlNullType, SqlValue, TableTarget};

pub fn relief_feature_target(ctx: &ImportContext) -> TableTarget {
    let mut columns = vec![("id", ParamType::I64), ("lod", ParamType::I32)];
    if ctx.capabilities.supports(SchemaFeature::ReliefExtent) {
        columns.push(("extent", ParamType::Bytes));
    }
    TableTarget::new(&ctx.schema, "relief_feature", &columns)
}

pub fn relief_component_target(ctx: &ImportContext) -> TableTarget {
    TableTarget::new(
        &ctx.schema,
        "relief_component",
        &[
            ("id", ParamType::I64),
            ("objectclass_id", ParamType::I32),
            ("lod", ParamType::I32),
        ],
    )
}

pub fn tin_relief_target(ctx: &ImportContext) -> TableTarget {
    TableTarget::new(
        &ctx.schema,
        "tin_relief",
        &[
            ("id", ParamType::I64),
            ("max_length", ParamType::F64),
            ("relief_points", ParamType::Bytes),
        ],
    )
}

pub fn masspoint_relief_target(ctx: &ImportContext) -> TableTarget {
    TableTarget::new(
        &ctx.schema,
        "masspoint_relief",
        &[("id", ParamType::I64), ("relief_points", ParamType::Bytes)],
    )
}

pub fn relief_feat_to_rel_comp_target(ctx: &ImportContext) -> TableTarget {
    TableTarget::new(
        &ctx.schema,
        "relief_feat_to_rel_comp",
        &[
            ("relief_feature_id", ParamType::I64),
            ("relief_component_id", ParamType::I64),
        ],
    )
}

/// Import a relief feature with its components. Returns the relief
/// feature's identity.
pub async fn import_relief(ctx: &mut ImportContext, entity: &CityObject) -> Result<i64> {
    if entity.class != FeatureClass::ReliefFeature {
        return Err(ImportError::classification(
            entity.label(),
            format!("expected a ReliefFeature, got {}", entity.class.name()),
        ));
    }

    let objectclass_id = match entity.class.objectclass_id() {
        Some(id) => id,
        None => {
            return Err(ImportError::classification(
                entity.label(),
                "relief feature has no object class",
            ))
        }
    };
    let id = import_city_object(ctx, entity, objectclass_id).await?;

    let lod = entity.attr_int("lod").unwrap_or(0) as i32;
    let mut row = vec![SqlValue::I64(id), SqlValue::I32(lod)];
    if ctx.capabilities.supports(SchemaFeature::ReliefExtent) {
        let extent = match &entity.geometry {
            Some(value) => {
                let converter = ctx.converter.clone();
                converter.convert(value, ctx.srid)?
            }
            None => SqlValue::Null(SqlNullType::Bytes),
        };
        row.push(extent);
    }
    let target = relief_feature_target(ctx);
    ctx.writers.enqueue(&target, row).await?;

    for component in &entity.children {
        match component.class {
            FeatureClass::TinRelief | FeatureClass::MassPointRelief => {
                let component_id = import_relief_component(ctx, component).await?;
                let target = relief_feat_to_rel_comp_target(ctx);
                ctx.writers
                    .enqueue(&target, vec![SqlValue::I64(id), SqlValue::I64(component_id)])
                    .await?;
            }
            _ => {
                ctx.skip_or_abort(
                    &component.label(),
                    ImportError::unsupported(entity.label(), component.class.name().to_string()),
                )?;
            }
        }
    }

    for reference in &entity.references {
        if reference.role != "reliefComponent" {
            ctx.skip_or_abort(
                &entity.label(),
                ImportError::unsupported(
                    entity.label(),
                    format!("reference role {}", reference.role),
                ),
            )?;
            continue;
        }
        match &reference.target {
            RefTarget::Inline(component) => {
                if !matches!(
                    component.class,
                    FeatureClass::TinRelief | FeatureClass::MassPointRelief
                ) {
                    ctx.skip_or_abort(
                        &component.label(),
                        ImportError::unsupported(
                            entity.label(),
                            format!("inline component of class {}", component.class.name()),
                        ),
                    )?;
                    continue;
                }
                let component_id = import_relief_component(ctx, component).await?;
                let target = relief_feat_to_rel_comp_target(ctx);
                ctx.writers
                    .enqueue(&target, vec![SqlValue::I64(id), SqlValue::I64(component_id)])
                    .await?;
            }
            RefTarget::External(href) => {
                ctx.ledger.register(ForwardReference {
                    join_table: relief_feat_to_rel_comp_target(ctx),
                    source_id: id,
                    target_external_id: href.clone(),
                });
            }
        }
    }

    run_delegates(ctx, entity, id).await?;
    Ok(id)
}

/// Import one supported relief component.
async fn import_relief_component(ctx: &mut ImportContext, component: &CityObject) -> Result<i64> {
    let objectclass_id = match component.class.objectclass_id() {
        Some(id) => id,
        None => {
            return Err(ImportError::classification(
                component.label(),
                "relief component has no object class",
            ))
        }
    };
    let id = import_city_object(ctx, component, objectclass_id).await?;

    let lod = component.attr_int("lod").unwrap_or(0) as i32;
    let target = relief_component_target(ctx);
    ctx.writers
        .enqueue(
            &target,
            vec![
                SqlValue::I64(id),
                SqlValue::I32(objectclass_id),
                SqlValue::I32(lod),
            ],
        )
        .await?;

    let points = match &component.geometry {
        Some(value) => {
            let converter = ctx.converter.clone();
            converter.convert(value, ctx.srid)?
        }
        None => SqlValue::Null(SqlNullType::Bytes),
    };

    match component.class {
        FeatureClass::TinRelief => {
            let row = vec![
                SqlValue::I64(id),
                double_or_null(component.attr_double("maxLength")),
                points,
            ];
            let target = tin_relief_target(ctx);
            ctx.writers.enqueue(&target, row).await?;
        }
        FeatureClass::MassPointRelief => {
            let row = vec![SqlValue::I64(id), points];
            let target = masspoint_relief_target(ctx);
            ctx.writers.enqueue(&target, row).await?;
        }
        _ => {
            return Err(ImportError::unsupported(
                component.label(),
                component.class.name().to_string(),
            ))
        }
    }

    run_delegates(ctx, component, id).await?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::OnUnsupported;
    use crate::extension::DelegateRegistry;
    use crate::geometry::{EwkbConverter, GeometryValue};
    use crate::model::AttributeValue;
    use crate::schema::SchemaCapabilities;
    use crate::target::testing::RecordingSink;
    use std::sync::Arc;

    fn context(sink: Arc<RecordingSink>, version: u32, policy: OnUnsupported) -> ImportContext {
        ImportContext::new(
            sink,
            "citydb",
            25832,
            100,
            policy,
            SchemaCapabilities::from_version(version),
            DelegateRegistry::new(),
            Arc::new(EwkbConverter),
        )
    }

    fn relief_with_tin() -> CityObject {
        CityObject::new(FeatureClass::ReliefFeature)
            .with_gml_id("RELIEF_1")
            .with_attribute("lod", AttributeValue::Int(2))
            .with_child(
                CityObject::new(FeatureClass::TinRelief)
                    .with_attribute("maxLength", AttributeValue::Double(50.0))
                    .with_geometry(GeometryValue::MultiPoint(vec![
                        [0.0, 0.0, 10.0],
                        [5.0, 0.0, 11.0],
                        [0.0, 5.0, 12.0],
                    ])),
            )
    }

    #[tokio::test]
    async fn test_tin_component_joined_to_feature() {
        let sink = Arc::new(RecordingSink::new(4));
        let mut ctx = context(sink.clone(), 4, OnUnsupported::Skip);

        let feature_id = import_relief(&mut ctx, &relief_with_tin()).await.unwrap();
        ctx.writers.flush_all().await.unwrap();

        let tins = sink.rows_for("citydb.tin_relief");
        assert_eq!(tins.len(), 1);
        assert_eq!(tins[0][1], SqlValue::F64(50.0));

        let joins = sink.rows_for("citydb.relief_feat_to_rel_comp");
        assert_eq!(joins.len(), 1);
        assert_eq!(joins[0][0], SqlValue::I64(feature_id));
    }

    #[tokio::test]
    async fn test_extent_column_gated_by_capability() {
        let old_sink = Arc::new(RecordingSink::new(3));
        let mut old_ctx = context(old_sink.clone(), 3, OnUnsupported::Skip);
        let feature = CityObject::new(FeatureClass::ReliefFeature).with_geometry(
            GeometryValue::Envelope {
                min: [0.0, 0.0],
                max: [100.0, 100.0],
            },
        );
        import_relief(&mut old_ctx, &feature).await.unwrap();
        old_ctx.writers.flush_all().await.unwrap();
        assert_eq!(old_sink.rows_for("citydb.relief_feature")[0].len(), 2);

        let new_sink = Arc::new(RecordingSink::new(4));
        let mut new_ctx = context(new_sink.clone(), 4, OnUnsupported::Skip);
        import_relief(&mut new_ctx, &feature).await.unwrap();
        new_ctx.writers.flush_all().await.unwrap();
        let rows = new_sink.rows_for("citydb.relief_feature");
        assert_eq!(rows[0].len(), 3);
        assert!(matches!(&rows[0][2], SqlValue::Bytes(_)));
    }

    #[tokio::test]
    async fn test_raster_component_skipped_by_default() {
        let sink = Arc::new(RecordingSink::new(4));
        let mut ctx = context(sink.clone(), 4, OnUnsupported::Skip);

        let feature = CityObject::new(FeatureClass::ReliefFeature)
            .with_child(CityObject::new(FeatureClass::RasterRelief).with_gml_id("RASTER_1"));

        import_relief(&mut ctx, &feature).await.unwrap();
        ctx.writers.flush_all().await.unwrap();

        assert_eq!(ctx.stats.skipped.len(), 1);
        assert!(ctx.stats.skipped[0].entity.contains("RASTER_1"));
        assert!(sink.rows_for("citydb.relief_feat_to_rel_comp").is_empty());
    }

    #[tokio::test]
    async fn test_raster_component_fatal_under_abort() {
        let sink = Arc::new(RecordingSink::new(4));
        let mut ctx = context(sink, 4, OnUnsupported::Abort);

        let feature = CityObject::new(FeatureClass::ReliefFeature)
            .with_child(CityObject::new(FeatureClass::RasterRelief));

        let result = import_relief(&mut ctx, &feature).await;
        assert!(matches!(
            result,
            Err(ImportError::UnsupportedVariant { .. })
        ));
    }

    #[tokio::test]
    async fn test_inline_component_of_wrong_class_skipped_before_write() {
        let sink = Arc::new(RecordingSink::new(4));
        let mut ctx = context(sink.clone(), 4, OnUnsupported::Skip);

        let feature = CityObject::new(FeatureClass::ReliefFeature)
            .with_gml_id("RELIEF_1")
            .with_inline_ref(
                "reliefComponent",
                CityObject::new(FeatureClass::RasterRelief).with_gml_id("RASTER_REF"),
            );

        import_relief(&mut ctx, &feature).await.unwrap();
        ctx.writers.flush_all().await.unwrap();

        assert_eq!(ctx.stats.imported, 1);
        assert_eq!(ctx.stats.skipped.len(), 1);
        assert!(ctx.stats.skipped[0].entity.contains("RASTER_REF"));
        assert!(sink.rows_for("citydb.relief_component").is_empty());
        assert!(sink.rows_for("citydb.relief_feat_to_rel_comp").is_empty());
    }

    #[tokio::test]
    async fn test_href_component_registered_in_ledger() {
        let sink = Arc::new(RecordingSink::new(4));
        let mut ctx = context(sink, 4, OnUnsupported::Skip);

        let feature = CityObject::new(FeatureClass::ReliefFeature)
            .with_external_ref("reliefComponent", "TIN_ELSEWHERE");

        import_relief(&mut ctx, &feature).await.unwrap();
        assert_eq!(ctx.ledger.len(), 1);
    }
}
