//! Shared base-entity importer.
//!
//! Every city object feature owns one row in the `cityobject` table; the
//! per-kind importers delegate identity allocation and the base row to
//! this module.

use super::ImportContext;
use crate::error::Result;
use crate::model::CityObject;
use crate::schema::SchemaFeature;
use crate::target::{ParamType, SqlNullType, SqlValue, TableTarget};

/// Base table target for the active schema. The codespace column is
/// conditional on the capability probe.
pub fn cityobject_target(ctx: &ImportContext) -> TableTarget {
    let mut columns = vec![
        ("id", ParamType::I64),
        ("objectclass_id", ParamType::I32),
        ("gmlid", ParamType::Text),
        ("name", ParamType::Text),
        ("description", ParamType::Text),
    ];
    if ctx.capabilities.supports(SchemaFeature::GmlIdCodespace) {
        columns.push(("gmlid_codespace", ParamType::Text));
    }
    TableTarget::new(&ctx.schema, "cityobject", &columns)
}

/// Allocate an identity for `entity`, write its base row, and index its
/// external identifier for the resolution pass.
pub async fn import_city_object(
    ctx: &mut ImportContext,
    entity: &CityObject,
    objectclass_id: i32,
) -> Result<i64> {
    let id = ctx.allocate_id();
    if let Some(gml_id) = &entity.gml_id {
        ctx.record_external_id(gml_id, id);
    }

    let target = cityobject_target(ctx);
    let mut row = vec![
        SqlValue::I64(id),
        SqlValue::I32(objectclass_id),
        text_or_null(entity.gml_id.as_deref()),
        text_or_null(entity.attr_text("name")),
        text_or_null(entity.attr_text("description")),
    ];
    if ctx.capabilities.supports(SchemaFeature::GmlIdCodespace) {
        row.push(text_or_null(entity.gml_id_codespace.as_deref()));
    }

    ctx.writers.enqueue(&target, row).await?;
    ctx.stats.imported += 1;
    Ok(id)
}

/// Bind an optional text value.
pub(crate) fn text_or_null(value: Option<&str>) -> SqlValue {
    match value {
        Some(s) => SqlValue::String(s.to_string()),
        None => SqlValue::Null(SqlNullType::String),
    }
}

/// Bind an optional double value.
pub(crate) fn double_or_null(value: Option<f64>) -> SqlValue {
    match value {
        Some(v) => SqlValue::F64(v),
        None => SqlValue::Null(SqlNullType::F64),
    }
}

/// Bind an optional 32-bit integer value.
pub(crate) fn int_or_null(value: Option<i32>) -> SqlValue {
    match value {
        Some(v) => SqlValue::I32(v),
        None => SqlValue::Null(SqlNullType::I32),
    }
}

/// Bind an optional 64-bit identity value.
pub(crate) fn id_or_null(value: Option<i64>) -> SqlValue {
    match value {
        Some(v) => SqlValue::I64(v),
        None => SqlValue::Null(SqlNullType::I64),
    }
}
