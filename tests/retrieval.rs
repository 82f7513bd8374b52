mod common;

use astro_query::agent_prompts::PromptBuilder;
use astro_query::catalog::Catalog;
use astro_query::error::AstroError;
use astro_query::schema_rag::{Embedder, HashEmbedder, SchemaIndex, SchemaRetriever};
use common::*;
use std::sync::Arc;

#[tokio::test]
async fn test_retrieval_is_deterministic() {
    let retriever = retriever().await;
    let first = retriever.retrieve("stars with magnitude < 15", 4).await.unwrap();
    for _ in 0..5 {
        let again = retriever.retrieve("stars with magnitude < 15", 4).await.unwrap();
        assert_eq!(again.summary(), first.summary());
    }
}

#[tokio::test]
async fn test_scores_are_non_increasing_and_bounded() {
    let retriever = retriever().await;
    let context = retriever.retrieve("spectroscopic redshift of galaxies", 5).await.unwrap();
    assert_eq!(context.len(), 5);
    let scores: Vec<f32> = context.entries().iter().map(|e| e.score).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));
}

#[tokio::test]
async fn test_star_question_selects_star_photometry() {
    let retriever = retriever().await;
    let context = retriever.retrieve("stars with magnitude < 15", 3).await.unwrap();
    assert_eq!(context.tables()[0], "Star");
    let prompt = PromptBuilder::new(10).render_context(&context);
    assert!(prompt.contains("Table Name: Star"));
}

#[tokio::test]
async fn test_dimension_mismatch_fails_fast() {
    let index = SchemaIndex::build(&catalog(), &HashEmbedder::new(256)).await.unwrap();
    let err = SchemaRetriever::new(Arc::new(index), Arc::new(HashEmbedder::new(128)))
        .err()
        .unwrap();
    assert!(matches!(err, AstroError::EmbeddingModelMismatch(_)));
}

#[tokio::test]
async fn test_index_file_round_trip_keeps_ranking() {
    let embedder = Arc::new(HashEmbedder::new(EMBEDDING_DIM));
    let index = SchemaIndex::build(&catalog(), embedder.as_ref()).await.unwrap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("index.json");
    index.save(&path).unwrap();

    let loaded = SchemaIndex::load(&path).unwrap();
    assert_eq!(loaded.model(), embedder.model_id());
    assert_eq!(loaded.len(), index.len());

    let original = SchemaRetriever::new(Arc::new(index), embedder.clone()).unwrap();
    let reloaded = SchemaRetriever::new(Arc::new(loaded), embedder).unwrap();
    let question = "petrosian radius of galaxies";
    assert_eq!(
        original.retrieve(question, 3).await.unwrap().summary(),
        reloaded.retrieve(question, 3).await.unwrap().summary()
    );
}

#[test]
fn test_catalog_round_trips_names_and_units() {
    let catalog = catalog();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("catalog.json");
    std::fs::write(&path, catalog.to_json().unwrap()).unwrap();

    let loaded = Catalog::load(&path).unwrap();
    let field = loaded.table("Star").unwrap().field("psfMag_r").unwrap();
    assert_eq!(field.unit, "mag");
    assert_eq!(field.description, "PSF magnitude of the stars in the r band");
    assert_eq!(loaded.len(), 3);
}

#[test]
fn test_missing_catalog_is_fatal_load_error() {
    let err = Catalog::load("/nonexistent/catalog.json").unwrap_err();
    assert!(matches!(err, AstroError::CatalogLoad(_)));
}
