mod helpers;

use std::time::Duration;

use helpers::harness;
use notemem::config::EmbedderPatch;
use notemem::embedding::EmbeddingError;
use notemem::error::{ErrorKind, MemoryError};
use notemem::memory::ListOptions;
use notemem::service::global::UpsertGlobalRequest;
use notemem::service::group::CreateGroupRequest;
use notemem::service::note::{AddNoteRequest, ListRecentRequest};
use tokio_util::sync::CancellationToken;

fn note(text: &str) -> AddNoteRequest {
    AddNoteRequest {
        project_id: "/p".into(),
        group_id: "global".into(),
        text: text.into(),
        ..Default::default()
    }
}

#[tokio::test]
async fn first_embedding_learns_dimension_once() {
    let h = harness();
    assert_eq!(h.config.namespace(), "openai:m");

    let first = h.services.notes.add_note(note("buy milk")).await.unwrap();
    assert_eq!(h.sink.reports(), vec![3]);
    assert_eq!(first.namespace, "openai:m:3");
    assert_eq!(h.config.embedder().dim, 3);

    let second = h.services.notes.add_note(note("buy eggs")).await.unwrap();
    assert_eq!(h.sink.reports(), vec![3]);
    assert_eq!(second.namespace, "openai:m:3");
}

#[tokio::test]
async fn fact_written_first_shares_the_note_namespace() {
    let h = harness();
    // Globals carry no text, so the dimension is resolved with a sample.
    let fact = h
        .services
        .globals
        .upsert_global(UpsertGlobalRequest {
            project_id: "/p".into(),
            key: "global.x".into(),
            value: serde_json::json!(1),
            updated_at: None,
        })
        .await
        .unwrap();
    assert_eq!(fact.namespace, "openai:m:3");
    assert_eq!(h.embedder.calls(), 1);

    let added = h.services.notes.add_note(note("learn now")).await.unwrap();
    assert_eq!(added.namespace, fact.namespace);
    assert_eq!(h.sink.reports(), vec![3]);
    h.services.globals.delete_global(&fact.id).await.unwrap();
}

#[tokio::test]
async fn reconfiguring_mid_embed_keeps_vector_with_its_model() {
    let h = std::sync::Arc::new(harness());
    h.embedder.set_delay(Duration::from_millis(300));

    let slow = {
        let h = std::sync::Arc::clone(&h);
        tokio::spawn(async move { h.services.notes.add_note(note("old model")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    h.services
        .config
        .set_config(EmbedderPatch {
            provider: Some("local".into()),
            model: Some("hash".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    let fast = h.services.notes.add_note(note("new model")).await.unwrap();
    let slow = slow.await.unwrap().unwrap();
    assert_eq!(slow.namespace, "openai:m:3");
    assert_eq!(fast.namespace, "local:hash:256");

    // The replaced embedder's late dimension report does not touch the config.
    assert_eq!(h.config.namespace(), "local:hash:256");

    let opts = ListOptions {
        project_id: "/p".into(),
        limit: 10,
        ..Default::default()
    };
    let old: Vec<_> = h
        .store
        .list_recent("openai:m:3", &opts)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.text)
        .collect();
    assert_eq!(old, vec!["old model"]);
    let new: Vec<_> = h
        .store
        .list_recent("local:hash:256", &opts)
        .await
        .unwrap()
        .into_iter()
        .map(|n| n.text)
        .collect();
    assert_eq!(new, vec!["new model"]);
}

#[tokio::test]
async fn cancelled_add_stores_nothing() {
    let h = harness();
    h.embedder.set_delay(Duration::from_secs(5));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = h
        .services
        .notes
        .add_note_with_cancel(note("never"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, MemoryError::Embedding(EmbeddingError::Cancelled)), "{err}");
    assert!(h.sink.reports().is_empty());

    let err = h
        .services
        .groups
        .create_group_with_cancel(
            CreateGroupRequest {
                project_id: "/p".into(),
                group_key: "k".into(),
                title: "T".into(),
                description: String::new(),
            },
            &cancel,
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Embedding);
    assert!(h.services.groups.list_groups("/p").await.unwrap().groups.is_empty());
}

#[tokio::test]
async fn get_config_masks_api_key() {
    let h = harness();
    let resp = h.services.config.get_config();
    assert_eq!(resp.config.embedder.api_key.as_deref(), Some("********"));
    assert_eq!(resp.namespace, "openai:m");

    let json = serde_json::to_value(&resp).unwrap();
    assert_eq!(json["namespace"], "openai:m");
    assert_eq!(json["embedder"]["provider"], "openai");
}

#[tokio::test]
async fn switching_model_resets_dimension_and_isolates_notes() {
    let h = harness();
    h.services.notes.add_note(note("old model note")).await.unwrap();
    assert_eq!(h.config.namespace(), "openai:m:3");

    let resp = h
        .services
        .config
        .set_config(EmbedderPatch {
            provider: Some("local".into()),
            model: Some("hash".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert!(resp.ok);
    assert_eq!(resp.effective_namespace, "local:hash");
    assert_eq!(h.config.embedder().dim, 0);

    let recent = h
        .services
        .notes
        .list_recent(ListRecentRequest {
            project_id: "/p".into(),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(recent.namespace, "local:hash");
    assert!(recent.items.is_empty());

    // The local embedder learns its default width on first use.
    let added = h.services.notes.add_note(note("new model note")).await.unwrap();
    assert_eq!(added.namespace, "local:hash:256");
    // The old fake embedder is no longer consulted.
    assert_eq!(h.embedder.calls(), 1);
}

#[tokio::test]
async fn same_model_patch_keeps_dimension() {
    let h = harness();
    h.services.notes.add_note(note("learn")).await.unwrap();

    let resp = h
        .services
        .config
        .set_config(EmbedderPatch {
            model: Some("m".into()),
            base_url: Some("http://127.0.0.1:9".into()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(resp.effective_namespace, "openai:m:3");
    assert_eq!(h.config.embedder().base_url.as_deref(), Some("http://127.0.0.1:9"));
}

#[tokio::test]
async fn empty_patch_is_a_no_op() {
    let h = harness();
    let resp = h.services.config.set_config(EmbedderPatch::default()).await.unwrap();
    assert_eq!(resp.effective_namespace, "openai:m");

    h.services.notes.add_note(note("still the fake")).await.unwrap();
    assert_eq!(h.embedder.calls(), 1);
}

#[tokio::test]
async fn unknown_provider_leaves_config_untouched() {
    let h = harness();
    let before = h.config.embedder();

    let err = h
        .services
        .config
        .set_config(EmbedderPatch {
            provider: Some("chroma".into()),
            ..Default::default()
        })
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Embedding);
    assert_eq!(h.config.embedder(), before);

    h.services.notes.add_note(note("fake still active")).await.unwrap();
    assert_eq!(h.embedder.calls(), 1);
}

#[tokio::test]
async fn stale_dimension_report_is_ignored() {
    let h = harness();
    h.services
        .config
        .set_config(EmbedderPatch {
            provider: Some("local".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    // A late report from the replaced coordinator must not pin a dimension
    // onto the new provider.
    use notemem::embedding::DimensionSink;
    assert!(h.sink.record_dimension(3).is_err());
    assert_eq!(h.config.namespace(), "local:m");
}
