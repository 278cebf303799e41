mod overwrite_protocol;

use crate::ingest::ContentBatch;
use crate::poll::PollPolicy;
use calamine::Data;
use std::time::Duration;
use vsctl_api::AssistantSpec;

/// Short polling so timeouts trip quickly.
fn fast_poll() -> PollPolicy {
    PollPolicy::new(Duration::from_millis(1), Duration::from_millis(50))
}

fn assistant_spec() -> AssistantSpec {
    AssistantSpec::new(
        "RAG Assistant",
        "Use the provided information to respond to user queries.",
        "gpt-3.5-turbo",
    )
}

/// A batch with columns `sku, colour` built from `(sku, colour)` pairs.
fn catalog_batch(rows: &[(&str, &str)]) -> ContentBatch {
    let header = vec![
        Data::String("sku".to_string()),
        Data::String("colour".to_string()),
    ];
    let cells: Vec<Vec<Data>> = rows
        .iter()
        .map(|(sku, colour)| {
            vec![
                Data::String(sku.to_string()),
                Data::String(colour.to_string()),
            ]
        })
        .collect();
    let rows: Vec<&[Data]> = cells.iter().map(Vec::as_slice).collect();
    ContentBatch::from_rows(&header, &rows)
}

fn catalog_v2() -> ContentBatch {
    catalog_batch(&[
        ("A-100", "crimson"),
        ("A-200", "teal"),
        ("A-300", "amber"),
        ("A-400", "violet"),
        ("A-500", "olive"),
    ])
}
