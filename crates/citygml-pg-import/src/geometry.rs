//! Geometry conversion boundary.
//!
//! Importers never interpret geometry themselves: a [`GeometryConverter`]
//! turns a generic [`GeometryValue`] into an opaque bound parameter for the
//! active connection. The default [`EwkbConverter`] produces extended WKB
//! byte payloads; alternative converters can be supplied at engine setup.

use crate::error::{ImportError, Result};
use crate::target::SqlValue;

/// A generic geometric value, already lifted out of the source document.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryValue {
    /// A single 3D point.
    Point { x: f64, y: f64, z: f64 },

    /// An unordered collection of 3D points (mass points, TIN control
    /// points).
    MultiPoint(Vec<[f64; 3]>),

    /// An axis-aligned 2D extent.
    Envelope { min: [f64; 2], max: [f64; 2] },
}

/// Converts geometry values into opaque bound parameters.
pub trait GeometryConverter: Send + Sync {
    /// Convert `geometry` for the given spatial reference system. The
    /// result is treated as an opaque parameter by the import engine.
    fn convert(&self, geometry: &GeometryValue, srid: i32) -> Result<SqlValue>;
}

/// Default converter producing extended WKB (little-endian, SRID flag set).
#[derive(Debug, Default)]
pub struct EwkbConverter;

// EWKB geometry type codes with the Z and SRID flags applied.
const EWKB_POINT_Z: u32 = 1 | 0x8000_0000 | 0x2000_0000;
const EWKB_MULTIPOINT_Z: u32 = 4 | 0x8000_0000 | 0x2000_0000;
const EWKB_POLYGON: u32 = 3 | 0x2000_0000;

impl GeometryConverter for EwkbConverter {
    fn convert(&self, geometry: &GeometryValue, srid: i32) -> Result<SqlValue> {
        let mut buf = Vec::with_capacity(64);
        match geometry {
            GeometryValue::Point { x, y, z } => {
                write_header(&mut buf, EWKB_POINT_Z, srid);
                write_coords(&mut buf, &[*x, *y, *z]);
            }
            GeometryValue::MultiPoint(points) => {
                if points.is_empty() {
                    return Err(ImportError::Geometry(
                        "multi-point geometry has no points".into(),
                    ));
                }
                write_header(&mut buf, EWKB_MULTIPOINT_Z, srid);
                buf.extend_from_slice(&(points.len() as u32).to_le_bytes());
                for point in points {
                    // Member points carry their own header without the
                    // SRID flag, per the EWKB nesting rules.
                    buf.push(1);
                    buf.extend_from_slice(&(1u32 | 0x8000_0000).to_le_bytes());
                    write_coords(&mut buf, point);
                }
            }
            GeometryValue::Envelope { min, max } => {
                write_header(&mut buf, EWKB_POLYGON, srid);
                buf.extend_from_slice(&1u32.to_le_bytes()); // one ring
                buf.extend_from_slice(&5u32.to_le_bytes()); // closed ring
                for corner in [
                    [min[0], min[1]],
                    [max[0], min[1]],
                    [max[0], max[1]],
                    [min[0], max[1]],
                    [min[0], min[1]],
                ] {
                    write_coords(&mut buf, &corner);
                }
            }
        }
        Ok(SqlValue::Bytes(buf))
    }
}

fn write_header(buf: &mut Vec<u8>, type_code: u32, srid: i32) {
    buf.push(1); // little endian
    buf.extend_from_slice(&type_code.to_le_bytes());
    buf.extend_from_slice(&srid.to_le_bytes());
}

fn write_coords(buf: &mut Vec<u8>, coords: &[f64]) {
    for c in coords {
        buf.extend_from_slice(&c.to_le_bytes());
    }
}
