//! Turns category/item/color selections into a text-to-image prompt.

use std::sync::Arc;

use tokio::task::JoinSet;

use crate::{
    error::PipelineError,
    models::{CategorySelection, ClothingItem},
    storage::CatalogStore,
};

const PROMPT_PREFIX: &str =
    "A male model figure curated with a fashionable sense of style. He is donned in:";
const PROMPT_SUFFIX: &str = concat!(
    ". All of this gives the figure a classy, reassuring, laidback look. ",
    "The image is presented in a photo realistic style, capturing the essence of an elegant male figure."
);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSelection {
    pub color_name: String,
    pub item: ClothingItem,
}

impl ResolvedSelection {
    /// `" Blue V-Neck Sweater,"`
    pub fn clause(&self) -> String {
        format!(" {} {},", self.color_name, self.item.name)
    }

    pub fn label(&self) -> String {
        format!("{} {}", self.color_name, self.item.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub selections: Vec<ResolvedSelection>,
    pub prompt: String,
    pub display_name: String,
}

pub fn build_prompt(clothing_properties: &str) -> String {
    format!("{PROMPT_PREFIX}{clothing_properties}{PROMPT_SUFFIX}")
}

pub fn validate_selections(selections: &[CategorySelection]) -> Result<(), PipelineError> {
    if selections.is_empty() {
        return Err(PipelineError::Validation(
            "at least one clothing selection is required".into(),
        ));
    }
    for (index, selection) in selections.iter().enumerate() {
        if selection.category_id.trim().is_empty() || selection.clothing_item_id.trim().is_empty() {
            return Err(PipelineError::Validation(format!(
                "selection {index} is missing a category or clothing id"
            )));
        }
        if selection.color_name.trim().is_empty() {
            return Err(PipelineError::Validation(format!(
                "selection {index} is missing a color"
            )));
        }
    }
    Ok(())
}

async fn resolve_one(
    catalog: &dyn CatalogStore,
    selection: CategorySelection,
) -> Result<ResolvedSelection, PipelineError> {
    let category = catalog
        .find_category(&selection.category_id)
        .await?
        .ok_or_else(|| PipelineError::not_found("category", &selection.category_id))?;
    let item = catalog
        .find_item(&category, &selection.clothing_item_id)
        .await?
        .ok_or_else(|| PipelineError::not_found("clothing item", &selection.clothing_item_id))?;
    Ok(ResolvedSelection {
        color_name: selection.color_name.trim().to_string(),
        item,
    })
}

/// Looks up every selection concurrently and assembles the prompt in selection order.
#[derive(Clone)]
pub struct SelectionResolver {
    catalog: Arc<dyn CatalogStore>,
}

impl SelectionResolver {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    pub async fn resolve(
        &self,
        selections: &[CategorySelection],
    ) -> Result<Resolution, PipelineError> {
        validate_selections(selections)?;

        let total = selections.len();
        let mut join_set = JoinSet::new();
        for (index, selection) in selections.iter().cloned().enumerate() {
            let catalog = self.catalog.clone();
            join_set.spawn(async move { (index, resolve_one(catalog.as_ref(), selection).await) });
        }

        let mut resolved: Vec<Option<ResolvedSelection>> =
            std::iter::repeat_with(|| None).take(total).collect();
        let mut first_error: Option<(usize, PipelineError)> = None;
        while let Some(joined) = join_set.join_next().await {
            let (index, result) = joined.map_err(|err| {
                PipelineError::persistence(format!("catalog lookup task failed: {err}"))
            })?;
            match result {
                Ok(selection) => resolved[index] = Some(selection),
                Err(err) => {
                    // Report the earliest failing selection regardless of completion order.
                    if first_error.as_ref().is_none_or(|(seen, _)| index < *seen) {
                        first_error = Some((index, err));
                    }
                }
            }
        }
        if let Some((_, err)) = first_error {
            return Err(err);
        }

        let selections: Vec<ResolvedSelection> = resolved.into_iter().flatten().collect();
        let clothing_properties: String = selections.iter().map(ResolvedSelection::clause).collect();
        let display_name = selections
            .iter()
            .map(ResolvedSelection::label)
            .collect::<Vec<_>>()
            .join(", ");
        Ok(Resolution {
            prompt: build_prompt(&clothing_properties),
            display_name,
            selections,
        })
    }
}
