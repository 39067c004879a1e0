use goku_engine::{Config, ErrorType, Goku, StreamOptions};
use goku_types::EventType;

pub async fn setup() -> Goku {
    Goku::open(Config::new(":memory:")).await.unwrap()
}

/// Assert the kinds of all events on keys with the given prefix, in order.
pub async fn assert_events(goku: &Goku, prefix: &str, expected: &[EventType]) {
    let mut stream = goku
        .streamer(prefix)
        .stream(0, StreamOptions { to_head: true })
        .await
        .unwrap();

    let mut kinds = Vec::new();
    loop {
        match stream.recv().await {
            Ok(event) => kinds.push(event.kind),
            Err(err) if matches!(err.variant, ErrorType::HeadReached) => break,
            Err(err) => panic!("unexpected stream error: {err}"),
        }
    }
    assert_eq!(kinds, expected, "events for prefix {prefix:?}");
}
