use crate::error::{KpiError, Result};
use crate::kpi::KpiCatalog;
use crate::position::{sorted_positions, PositionCode};
use crate::schema::{PositionSchema, SchemaNode, SchemaSection};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Rejects empty selections and selections with no recognised KPI.
/// Returns the recognised ids in submission order.
pub fn validate_selection<S: AsRef<str>>(
    kpi_ids: &[S],
    catalog: &KpiCatalog,
) -> Result<Vec<String>> {
    if kpi_ids.is_empty() {
        return Err(KpiError::EmptySelection);
    }

    let valid: Vec<String> = kpi_ids
        .iter()
        .map(|id| id.as_ref())
        .filter(|id| catalog.contains(id))
        .map(str::to_string)
        .collect();

    if valid.is_empty() {
        return Err(KpiError::NoValidKpi {
            submitted: kpi_ids.iter().map(|id| id.as_ref().to_string()).collect(),
        });
    }

    Ok(valid)
}

/// One input field of the data-entry form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormField {
    pub position: PositionCode,
    pub field_name: String,
    pub label: String,
}

/// A titled section of the data-entry form, mirroring the schema tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormSection {
    pub key: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FormField>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<FormSection>,
}

impl FormSection {
    pub fn field_count(&self) -> usize {
        self.fields.len() + self.sections.iter().map(FormSection::field_count).sum::<usize>()
    }
}

pub struct RequirementResolver<'a> {
    catalog: &'a KpiCatalog,
    schema: &'a PositionSchema,
}

impl<'a> RequirementResolver<'a> {
    pub fn new(catalog: &'a KpiCatalog, schema: &'a PositionSchema) -> Self {
        Self { catalog, schema }
    }

    /// Sorted, deduplicated union of the positions every recognised KPI needs.
    pub fn resolve<S: AsRef<str>>(&self, kpi_ids: &[S]) -> Result<Vec<PositionCode>> {
        let valid = validate_selection(kpi_ids, self.catalog)?;

        for id in kpi_ids.iter().map(|id| id.as_ref()) {
            if !self.catalog.contains(id) {
                debug!("Ignoring unknown KPI '{}'", id);
            }
        }

        let positions = sorted_positions(
            valid
                .iter()
                .filter_map(|id| self.catalog.get(id))
                .flat_map(|definition| definition.required_positions.iter().cloned()),
        );

        debug!(
            "Resolved {} positions for {} KPIs",
            positions.len(),
            valid.len()
        );

        Ok(positions)
    }

    /// The schema pruned to the positions the selection needs, with display titles.
    pub fn required_layout<S: AsRef<str>>(&self, kpi_ids: &[S]) -> Result<Vec<FormSection>> {
        let required: BTreeSet<PositionCode> = self.resolve(kpi_ids)?.into_iter().collect();
        Ok(self
            .schema
            .restricted_to(&required)
            .iter()
            .map(|section| self.form_section(section))
            .collect())
    }

    fn form_section(&self, section: &SchemaSection) -> FormSection {
        let mut form = FormSection {
            key: section.key.clone(),
            title: self.schema.section_title(&section.key),
            fields: Vec::new(),
            sections: Vec::new(),
        };

        match &section.node {
            SchemaNode::Leaf(positions) => {
                form.fields = positions
                    .iter()
                    .map(|position| FormField {
                        position: position.clone(),
                        field_name: position.field_name(),
                        label: self.schema.position_name(position),
                    })
                    .collect();
            }
            SchemaNode::Group(children) => {
                form.sections = children.iter().map(|c| self.form_section(c)).collect();
            }
        }

        form
    }
}
