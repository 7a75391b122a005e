//! Action list editing for subscription drafts
//!
//! The draft keeps its actions in a plain vector addressed by `idx`, a dense
//! 1-based position. Field edits address a row by `idx` and leave every other
//! row untouched; structural changes (append, remove) renumber the whole list
//! in one pass. A failed operation leaves the list exactly as it was.

use tracing::debug;

use cloudrec_api::{ActionFields, ActionItem, ActionType, SubmittedAction};
use cloudrec_common::{CloudRecError, Result};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ActionListEditor {
    items: Vec<ActionItem>,
}

impl ActionListEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a saved action list; `idx` is re-derived from the saved order
    pub fn from_saved(actions: Vec<SubmittedAction>) -> Self {
        let items = actions
            .into_iter()
            .enumerate()
            .map(|(i, action)| ActionItem {
                idx: i as u32 + 1,
                action_type: action.action_type,
                fields: action.fields,
            })
            .collect();
        Self { items }
    }

    pub fn items(&self) -> &[ActionItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, idx: u32) -> Option<&ActionItem> {
        self.items.iter().find(|item| item.idx == idx)
    }

    /// Append one unconfigured row per selected type, in selection order
    pub fn append_batch(&mut self, types: &[ActionType]) -> &[ActionItem] {
        self.items
            .extend(types.iter().map(|t| ActionItem::new(0, *t)));
        self.renumber();
        debug!(added = types.len(), total = self.items.len(), "Actions appended");
        &self.items
    }

    /// Replace the fields of the row at `idx`. The fields are validated for
    /// that row's action type before anything changes.
    pub fn replace_by_idx(&mut self, idx: u32, fields: ActionFields) -> Result<&[ActionItem]> {
        let position = self.position(idx)?;
        fields.validate_for(self.items[position].action_type)?;
        self.items[position].fields = fields;
        debug_assert!(self.is_dense());
        Ok(&self.items)
    }

    /// Remove the row at `idx` and close the gap
    pub fn remove_by_idx(&mut self, idx: u32) -> Result<&[ActionItem]> {
        let position = self.position(idx)?;
        self.items.remove(position);
        self.renumber();
        debug!(idx, total = self.items.len(), "Action removed");
        Ok(&self.items)
    }

    /// Whether the `idx` values are exactly `1..=len` in list order
    pub fn is_dense(&self) -> bool {
        self.items
            .iter()
            .enumerate()
            .all(|(i, item)| item.idx as usize == i + 1)
    }

    /// The list as sent with the parent form: every row validated, `idx`
    /// stripped, order preserved
    pub fn submission(&self) -> Result<Vec<SubmittedAction>> {
        self.items
            .iter()
            .map(|item| {
                item.validate().map_err(|e| match e {
                    CloudRecError::Validation(msg) => {
                        CloudRecError::Validation(format!("action #{}: {}", item.idx, msg))
                    }
                    other => other,
                })?;
                Ok(item.clone().into_submitted())
            })
            .collect()
    }

    pub fn into_submission(self) -> Result<Vec<SubmittedAction>> {
        self.submission()
    }

    /// One line per row, e.g. `1. timing: dingGroup`
    pub fn summary(&self) -> Vec<String> {
        self.items
            .iter()
            .map(|item| match item.fields.action {
                Some(channel) => format!("{}. {}: {}", item.idx, item.action_type, channel.as_str()),
                None => format!("{}. {}: not configured", item.idx, item.action_type),
            })
            .collect()
    }

    fn position(&self, idx: u32) -> Result<usize> {
        self.items
            .iter()
            .position(|item| item.idx == idx)
            .ok_or_else(|| CloudRecError::NotFound(format!("action #{}", idx)))
    }

    fn renumber(&mut self) {
        for (i, item) in self.items.iter_mut().enumerate() {
            item.idx = i as u32 + 1;
        }
        debug_assert!(self.is_dense());
    }
}
