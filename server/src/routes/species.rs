//! Species catalog endpoint

use axum::{extract::State, Json};
use serde::Serialize;

use theraphosid::inference::tarantupedia_link;

use crate::state::SharedState;

#[derive(Serialize)]
pub struct SpeciesEntry {
    pub class_id: usize,
    pub species: String,
    pub tarantupedia_link: String,
}

#[derive(Serialize)]
pub struct SpeciesResponse {
    pub count: usize,
    pub species: Vec<SpeciesEntry>,
}

/// GET /species - The label catalog the served model was trained with
pub async fn list_species(State(state): State<SharedState>) -> Json<SpeciesResponse> {
    let species: Vec<SpeciesEntry> = state
        .predictor
        .catalog()
        .names()
        .iter()
        .enumerate()
        .map(|(class_id, name)| SpeciesEntry {
            class_id,
            species: name.clone(),
            tarantupedia_link: tarantupedia_link(name),
        })
        .collect();

    Json(SpeciesResponse {
        count: species.len(),
        species,
    })
}
