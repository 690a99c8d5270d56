//! 2D feature geometry to globe primitives.

use earcutr::earcut;
use foundation::math::{
    EnuFrame, Geodetic, Projection, Vec3, ecef_to_geodetic, geodetic_to_ecef,
};
use layers::{FeatureStyle, Geometry2d};
use scene::Primitive;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConvertError {
    #[error("coordinate {0:?} is not finite")]
    NonFinite([f64; 2]),
    #[error("a line needs at least 2 vertices, got {0}")]
    ShortLine(usize),
    #[error("a polygon ring needs at least 3 vertices, got {0}")]
    ShortRing(usize),
    #[error("polygon could not be triangulated")]
    Triangulation,
}

/// Map coordinate in `projection` units to ECEF at `height` meters.
pub fn map_to_ecef(projection: Projection, xy: [f64; 2], height: f64) -> Result<Vec3, ConvertError> {
    if !(xy[0].is_finite() && xy[1].is_finite()) {
        return Err(ConvertError::NonFinite(xy));
    }
    let lon_lat = projection.to_lon_lat(xy);
    Ok(geodetic_to_ecef(Geodetic::from_lon_lat_deg(lon_lat, height)))
}

/// Converts one feature geometry. Fails as a whole if any part is malformed.
pub fn geometry_to_primitives(
    geometry: &Geometry2d,
    style: &FeatureStyle,
    projection: Projection,
) -> Result<Vec<Primitive>, ConvertError> {
    let point = |xy: [f64; 2]| -> Result<Primitive, ConvertError> {
        Ok(Primitive::Point {
            position: map_to_ecef(projection, xy, 0.0)?,
            color: style.fill,
            pixel_size: 2.0 * style.point_radius,
        })
    };
    let line = |coords: &[[f64; 2]]| -> Result<Primitive, ConvertError> {
        if coords.len() < 2 {
            return Err(ConvertError::ShortLine(coords.len()));
        }
        Ok(Primitive::Polyline {
            positions: to_ecef_all(projection, coords)?,
            color: style.stroke,
            width: style.stroke_width,
        })
    };

    match geometry {
        Geometry2d::Point(xy) => Ok(vec![point(*xy)?]),
        Geometry2d::MultiPoint(points) => points.iter().map(|xy| point(*xy)).collect(),
        Geometry2d::LineString(coords) => Ok(vec![line(coords.as_slice())?]),
        Geometry2d::MultiLineString(lines) => lines.iter().map(|l| line(l.as_slice())).collect(),
        Geometry2d::Polygon(rings) => Ok(vec![polygon(rings, style, projection)?]),
    }
}

fn to_ecef_all(projection: Projection, coords: &[[f64; 2]]) -> Result<Vec<Vec3>, ConvertError> {
    coords
        .iter()
        .map(|xy| map_to_ecef(projection, *xy, 0.0))
        .collect()
}

fn polygon(
    rings: &[Vec<[f64; 2]>],
    style: &FeatureStyle,
    projection: Projection,
) -> Result<Primitive, ConvertError> {
    let mut ecef_rings = Vec::with_capacity(rings.len());
    for ring in rings {
        let mut points = to_ecef_all(projection, ring)?;
        drop_closing_duplicate(&mut points);
        if points.len() < 3 {
            return Err(ConvertError::ShortRing(points.len()));
        }
        ecef_rings.push(points);
    }
    if ecef_rings.is_empty() {
        return Err(ConvertError::ShortRing(0));
    }

    let (positions, indices) = triangulate(&ecef_rings)?;
    Ok(Primitive::Polygon {
        positions,
        indices,
        fill: style.fill,
        outline: ecef_rings,
        outline_color: style.stroke,
    })
}

/// Triangulates in the tangent plane at the exterior ring's centroid.
fn triangulate(rings: &[Vec<Vec3>]) -> Result<(Vec<Vec3>, Vec<u32>), ConvertError> {
    let Some(outer) = rings.first() else {
        return Err(ConvertError::ShortRing(0));
    };
    let sum = outer.iter().fold(Vec3::ZERO, |acc, p| acc + *p);
    let centroid = sum * (1.0 / outer.len() as f64);
    let frame = EnuFrame::at(ecef_to_geodetic(centroid));

    let mut positions = Vec::new();
    let mut coords = Vec::new();
    let mut holes = Vec::new();
    for (i, ring) in rings.iter().enumerate() {
        if i > 0 {
            holes.push(positions.len());
        }
        for p in ring {
            let local = frame.vector_to_local(*p - centroid);
            coords.push(local.east);
            coords.push(local.north);
            positions.push(*p);
        }
    }

    let indices = earcut(&coords, &holes, 2).map_err(|_| ConvertError::Triangulation)?;
    if indices.is_empty() {
        return Err(ConvertError::Triangulation);
    }
    let indices = indices.into_iter().map(|i| i as u32).collect();
    Ok((positions, indices))
}

fn drop_closing_duplicate(points: &mut Vec<Vec3>) {
    if let (Some(first), Some(last)) = (points.first(), points.last())
        && points.len() >= 2
        && first.max_abs_diff(*last) < 1e-9
    {
        points.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::{ConvertError, geometry_to_primitives, map_to_ecef};
    use approx::assert_abs_diff_eq;
    use foundation::math::{Projection, WGS84_A};
    use layers::{FeatureStyle, Geometry2d};
    use scene::Primitive;

    fn convert(geometry: Geometry2d) -> Result<Vec<Primitive>, ConvertError> {
        geometry_to_primitives(&geometry, &FeatureStyle::default(), Projection::Geographic)
    }

    #[test]
    fn origin_maps_to_equator() {
        let p = map_to_ecef(Projection::WebMercator, [0.0, 0.0], 0.0).unwrap();
        assert_abs_diff_eq!(p.x, WGS84_A, epsilon = 1e-6);
        assert!(map_to_ecef(Projection::WebMercator, [f64::NAN, 0.0], 0.0).is_err());
    }

    #[test]
    fn square_with_closing_vertex_makes_two_triangles() {
        let ring = vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0], [0.0, 0.0]];
        let prims = convert(Geometry2d::Polygon(vec![ring])).unwrap();
        let [Primitive::Polygon { positions, indices, .. }] = prims.as_slice() else {
            panic!("expected one polygon, got {prims:?}");
        };
        assert_eq!(positions.len(), 4);
        assert_eq!(indices.len(), 6);
    }

    #[test]
    fn multi_geometries_expand() {
        let prims = convert(Geometry2d::MultiPoint(vec![[0.0, 0.0], [1.0, 1.0]])).unwrap();
        assert_eq!(prims.len(), 2);
        let prims = convert(Geometry2d::MultiLineString(vec![
            vec![[0.0, 0.0], [1.0, 1.0]],
            vec![[2.0, 2.0], [3.0, 3.0], [4.0, 3.0]],
        ]))
        .unwrap();
        assert!(prims.iter().all(|p| p.kind() == "polyline"));
    }

    #[test]
    fn malformed_geometries_are_rejected() {
        assert_eq!(
            convert(Geometry2d::LineString(vec![[0.0, 0.0]])),
            Err(ConvertError::ShortLine(1))
        );
        assert_eq!(
            convert(Geometry2d::Polygon(vec![vec![[0.0, 0.0], [1.0, 0.0], [0.0, 0.0]]])),
            Err(ConvertError::ShortRing(2))
        );
        assert_eq!(
            convert(Geometry2d::Point([f64::INFINITY, 0.0])),
            Err(ConvertError::NonFinite([f64::INFINITY, 0.0]))
        );
    }
}
