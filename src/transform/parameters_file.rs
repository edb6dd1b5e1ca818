//! Transform parameter files.
//!
//! Each stage writes its result as a parameter file that names the transform
//! component, its parameters, the combination mode and the file of the initial
//! transform it was combined with. Reading such a file rebuilds the whole
//! chain through the component registry.

use crate::component::ComponentRegistry;
use crate::config::{FromParameter, ParameterMap};
use crate::image::Geometry;
use crate::transform::{parse_stored, CombinationMode, TransformChain, TransformComponent};
use crate::util::{MultiRegError, MultiRegResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Value of `InitialTransformParametersFileName` for a chain's first link.
pub const NO_INITIAL_TRANSFORM: &str = "NoInitialTransform";

/// Longest chain of initial transform files that is followed.
const MAX_CHAIN_DEPTH: usize = 64;

/// Builds the parameter map describing `transform` at the end of a stage.
pub fn to_parameter_map(
    transform: &dyn TransformComponent,
    initial: Option<&TransformChain>,
    mode: CombinationMode,
    fixed: &Geometry,
) -> ParameterMap {
    let mut map = ParameterMap::new();
    map.set("Transform", [transform.name()]);
    map.set(
        "NumberOfParameters",
        [transform.number_of_parameters().to_string()],
    );
    map.set(
        "TransformParameters",
        transform.parameters().iter().map(f64::to_string),
    );
    let initial_file = initial
        .and_then(TransformChain::source)
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| NO_INITIAL_TRANSFORM.to_string());
    map.set("InitialTransformParametersFileName", [initial_file]);
    map.set("HowToCombineTransforms", [mode.as_str()]);
    map.set("FixedImageDimension", [fixed.dimension().to_string()]);
    map.set("Size", fixed.size().iter().map(usize::to_string));
    map.set("Spacing", fixed.spacing().iter().map(f64::to_string));
    map.set("Origin", fixed.origin().iter().map(f64::to_string));
    transform.write_parameters(&mut map);
    map
}

/// Writes a parameter map as text.
pub fn write_parameter_map(map: &ParameterMap, path: &Path) -> MultiRegResult<()> {
    std::fs::write(path, map.to_text()).map_err(|err| MultiRegError::io(path, err))
}

/// Rebuilds the transform chain stored in `path`.
pub fn read_chain(path: &Path, registry: &ComponentRegistry) -> MultiRegResult<Arc<TransformChain>> {
    read_chain_at_depth(path, registry, 0)
}

fn read_chain_at_depth(
    path: &Path,
    registry: &ComponentRegistry,
    depth: usize,
) -> MultiRegResult<Arc<TransformChain>> {
    if depth >= MAX_CHAIN_DEPTH {
        return Err(MultiRegError::InvalidParameter {
            key: "InitialTransformParametersFileName".into(),
            value: path.display().to_string(),
            expected: "a chain of fewer than 64 transform files",
        });
    }
    let map = ParameterMap::from_path(path)?;
    let name: String = first(&map, "Transform")?;
    let mut transform = registry.create_transform(&name)?;
    transform.read_parameters(&map)?;

    let mode = match map.values("HowToCombineTransforms").and_then(|v| v.first()) {
        Some(value) => parse_stored("HowToCombineTransforms", value)?,
        None => CombinationMode::default(),
    };
    let initial = match map
        .values("InitialTransformParametersFileName")
        .and_then(|v| v.first())
    {
        Some(file) if file != NO_INITIAL_TRANSFORM => {
            Some(read_chain_at_depth(&PathBuf::from(file), registry, depth + 1)?)
        }
        _ => None,
    };

    Ok(Arc::new(
        TransformChain::new(
            name,
            transform.snapshot(),
            transform.parameters().to_vec(),
            initial,
            mode,
        )
        .with_source(path),
    ))
}

fn first<T: FromParameter>(map: &ParameterMap, key: &str) -> MultiRegResult<T> {
    let value = map
        .values(key)
        .and_then(|v| v.first())
        .ok_or_else(|| MultiRegError::MissingParameter {
            key: key.to_string(),
            label: String::new(),
        })?;
    parse_stored(key, value)
}

#[cfg(test)]
mod tests {
    use super::{read_chain, to_parameter_map, write_parameter_map, NO_INITIAL_TRANSFORM};
    use crate::component::ComponentRegistry;
    use crate::image::Geometry;
    use crate::transform::{CombinationMode, Transform, TransformComponent, TranslationTransform};
    use std::path::PathBuf;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("multireg-{name}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn chained_files_rebuild_the_transform() {
        let dir = temp_dir("tpfile");
        let registry = ComponentRegistry::with_builtins().unwrap();
        let fixed = Geometry::new(vec![8, 8]).unwrap();

        let first = TranslationTransform::with_offset(vec![1.0, 2.0]);
        let map = to_parameter_map(&first, None, CombinationMode::Compose, &fixed);
        assert_eq!(
            map.values("InitialTransformParametersFileName").unwrap(),
            &[NO_INITIAL_TRANSFORM.to_string()]
        );
        let path0 = dir.join("TransformParameters.0.txt");
        write_parameter_map(&map, &path0).unwrap();
        let chain0 = read_chain(&path0, &registry).unwrap();

        let second = TranslationTransform::with_offset(vec![0.5, 0.5]);
        let map = to_parameter_map(&second, Some(&chain0), CombinationMode::Compose, &fixed);
        let path1 = dir.join("TransformParameters.1.txt");
        write_parameter_map(&map, &path1).unwrap();
        let chain1 = read_chain(&path1, &registry).unwrap();

        assert_eq!(chain1.depth(), 2);
        assert_eq!(chain1.parameters(), second.parameters());
        let mut out = [0.0; 2];
        chain1.transform_point(&[0.0, 0.0], &mut out);
        assert_eq!(out, [1.5, 2.5]);
        std::fs::remove_dir_all(&dir).ok();
    }
}
