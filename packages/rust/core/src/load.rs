//! Stages that bring local inputs into the store.

use std::path::PathBuf;

use async_trait::async_trait;
use tracing::{info, warn};

use reportflow_artifacts::{IntermediateStore, load_outline_shape};
use reportflow_flow::{Compartment, DEFAULT_TRANSITION, Node, SharedStore};
use reportflow_materials::{LoadOptions, LoadedMaterials, load_materials};
use reportflow_shared::{Outline, ReportFlowError, Result};

use crate::state::{Input, Materials, OutlineState};

/// Intermediate category for conversion records.
pub const CONVERSION_INFO: &str = "conversion_info";

const INPUT_HINT: &str = "seed the store with the run input";

// ---------------------------------------------------------------------------
// LoadMaterials
// ---------------------------------------------------------------------------

/// Reads the materials directory into the `materials` compartment.
#[derive(Debug, Default)]
pub struct LoadMaterials;

pub struct MaterialsRequest {
    dir: PathBuf,
    options: LoadOptions,
    output_dir: PathBuf,
}

#[async_trait]
impl Node for LoadMaterials {
    type Prepared = MaterialsRequest;
    type Output = LoadedMaterials;

    fn name(&self) -> &str {
        "load_materials"
    }

    fn prepare(&self, store: &SharedStore) -> Result<MaterialsRequest> {
        let input = store.require::<Input>(INPUT_HINT)?;
        Ok(MaterialsRequest {
            dir: input.materials_dir.clone(),
            options: LoadOptions {
                conversion_dir: input.conversion_dir(),
                use_cache: true,
            },
            output_dir: input.output_dir.clone(),
        })
    }

    async fn execute(&self, request: &MaterialsRequest) -> Result<LoadedMaterials> {
        let dir = request.dir.clone();
        let options = request.options.clone();
        tokio::task::spawn_blocking(move || load_materials(&dir, &options))
            .await
            .map_err(|e| ReportFlowError::Conversion(format!("material loader stopped: {e}")))?
    }

    fn finalize(
        &self,
        store: &mut SharedStore,
        request: MaterialsRequest,
        loaded: LoadedMaterials,
    ) -> Result<String> {
        if !loaded.conversions.is_empty() {
            let path = IntermediateStore::new(&request.output_dir)
                .save_json(CONVERSION_INFO, &loaded.conversions)?;
            info!(path = %path.display(), conversions = loaded.conversions.len(), "conversion records saved");
        }

        let content_chars = loaded.content.chars().count();
        info!(
            file_count = loaded.file_count,
            chars = content_chars,
            dir = %request.dir.display(),
            "materials loaded"
        );
        store.put(Materials {
            content_chars,
            content: loaded.content,
            file_count: loaded.file_count,
            dir: request.dir,
            conversions: loaded.conversions,
        });
        Ok(DEFAULT_TRANSITION.into())
    }
}

// ---------------------------------------------------------------------------
// LoadOutline
// ---------------------------------------------------------------------------

/// Reads a user-supplied outline file into the `outline` compartment.
#[derive(Debug, Default)]
pub struct LoadOutline;

#[async_trait]
impl Node for LoadOutline {
    type Prepared = PathBuf;
    type Output = Outline;

    fn name(&self) -> &str {
        "load_outline"
    }

    fn prepare(&self, store: &SharedStore) -> Result<PathBuf> {
        let input = store.require::<Input>(INPUT_HINT)?;
        input
            .outline_path
            .clone()
            .ok_or_else(|| ReportFlowError::missing(Input::NAME, "no outline file was given"))
    }

    async fn execute(&self, path: &PathBuf) -> Result<Outline> {
        let outline = load_outline_shape(path)?.into_outline();
        if outline.leaf_count() == 0 {
            return Err(ReportFlowError::validation(format!(
                "outline {} has no sections",
                path.display()
            )));
        }
        Ok(outline)
    }

    fn finalize(
        &self,
        store: &mut SharedStore,
        path: PathBuf,
        outline: Outline,
    ) -> Result<String> {
        log_index_issues(&outline);
        info!(title = %outline.title, leaves = outline.leaf_count(), "outline loaded from file");
        store.put(OutlineState {
            outline,
            path: Some(path),
        });
        Ok(DEFAULT_TRANSITION.into())
    }
}

/// Warn about index problems without rejecting the outline.
pub(crate) fn log_index_issues(outline: &Outline) {
    for issue in outline.validate() {
        warn!(%issue, "outline index issue");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reportflow_flow::{Activate, ActivationContext, SilentObserver, Task, TokioSleeper};

    #[tokio::test]
    async fn loads_materials_and_records_conversions() {
        let dir = tempfile::tempdir().unwrap();
        let materials = dir.path().join("materials");
        std::fs::create_dir_all(&materials).unwrap();
        std::fs::write(materials.join("notes.md"), "# Notes\n\nTide tables.\n").unwrap();
        std::fs::write(
            materials.join("page.html"),
            "<html><body><p>Lunar pull</p></body></html>",
        )
        .unwrap();

        let out = dir.path().join("out");
        let mut store = SharedStore::new().with(Input::new("Tides", &materials).with_output_dir(&out));
        let ctx = ActivationContext {
            sleeper: &TokioSleeper,
            observer: &SilentObserver,
        };

        Task::new(LoadMaterials).activate(&mut store, &ctx).await.unwrap();

        let loaded = store.get::<Materials>().unwrap();
        assert_eq!(loaded.file_count, 2);
        assert!(loaded.content.contains("Tide tables."));
        assert!(loaded.content.contains("Lunar pull"));
        assert_eq!(loaded.conversions.len(), 1);
        assert!(
            IntermediateStore::new(&out)
                .latest(CONVERSION_INFO)
                .is_ok()
        );
    }

    #[tokio::test]
    async fn missing_materials_dir_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SharedStore::new().with(
            Input::new("Tides", dir.path().join("absent")).with_output_dir(dir.path()),
        );
        let ctx = ActivationContext {
            sleeper: &TokioSleeper,
            observer: &SilentObserver,
        };

        let err = Task::new(LoadMaterials)
            .activate(&mut store, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportFlowError::NotFound { .. }));
        assert!(!store.contains::<Materials>());
    }

    #[test]
    fn load_outline_requires_a_path() {
        let store = SharedStore::new().with(Input::new("T", "m"));
        let err = LoadOutline.prepare(&store).unwrap_err();
        assert!(matches!(err, ReportFlowError::MissingDependency { .. }));
    }

    #[tokio::test]
    async fn load_outline_normalizes_legacy_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outline.json");
        std::fs::write(
            &path,
            r#"{"title": "Old", "chapters": [{"index": 1, "title": "Intro", "description": "a"}]}"#,
        )
        .unwrap();

        let mut store = SharedStore::new().with(Input::new("T", "m").with_outline(&path));
        let prepared = LoadOutline.prepare(&store).unwrap();
        let outline = LoadOutline.execute(&prepared).await.unwrap();
        LoadOutline.finalize(&mut store, prepared, outline).unwrap();

        let state = store.get::<OutlineState>().unwrap();
        assert_eq!(state.outline.title, "Old");
        assert_eq!(state.outline.sections[0].index, "1");
        assert_eq!(state.path.as_deref(), Some(path.as_path()));
    }
}
