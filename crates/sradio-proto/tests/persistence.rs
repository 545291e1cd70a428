use sradio_proto::channels::ChannelCatalog;
use sradio_proto::state::{RadioState, StateStore, RADIO};

#[test]
fn channel_file_is_loaded_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("simple-radio.channels");
    std::fs::write(
        &path,
        "WDR2@http://stream.example/wdr2\nBR@http://stream.example/br\n",
    )
    .unwrap();

    let catalog = ChannelCatalog::load(&path).unwrap();
    let names: Vec<&str> = catalog.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["WDR2", "BR"]);
}

#[test]
fn missing_channel_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ChannelCatalog::load(&dir.path().join("nope")).unwrap_err();
    assert!(err.to_string().contains("could not read channel file"));
}

#[tokio::test]
async fn last_channel_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("data").join("state.json");

    let mut store = StateStore::load(path.clone());
    store.set(RADIO, &RadioState::with_channel(Some(1))).unwrap();
    store.set("amp", &serde_json::json!({ "volume": 70 })).unwrap();
    store.save().await.unwrap();

    let reloaded = StateStore::load(path.clone());
    let radio: RadioState = reloaded.get(RADIO);
    assert_eq!(radio.last_channel(), Some(1));

    // other components' entries are kept as-is
    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["amp"]["volume"], 70);
    assert_eq!(raw["radio"]["last_channel_index"], 1);
}
