//! Extraction and bulk-sync throughput.
//!
//! Run with: cargo bench

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::path::Path;
use tempfile::TempDir;
use vellum_core::{
    config::CoreConfig,
    db::DbConnection,
    extract::{ExtractMode, Extractor},
    vault::Vault,
};

fn sample_document(n: usize) -> String {
    let mut text = format!(
        "---\ntitle: Document {n}\npublic: true\ndate: 2024-01-{:02}\ntags: [bench, sample]\n---\n",
        n % 28 + 1
    );
    for line in 0..60 {
        match line % 6 {
            0 => text.push_str(&format!("See [doc](/doc{}.md \"next\").\n", (n + line) % 100)),
            1 => text.push_str("<img src=\"/img/figure.png\" alt=\"figure\">\n"),
            2 => text.push_str("<!--exc:start-->\nprivate [draft](/drafts/x.md)\n<!--exc:end-->\n"),
            _ => text.push_str("Plain prose with no links at all, just words to scan through.\n"),
        }
    }
    text
}

fn write_tree(root: &Path, count: usize) {
    for n in 0..count {
        let dir = root.join(format!("section{}", n % 10));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join(format!("doc{n}.md")), sample_document(n)).unwrap();
    }
}

fn bench_extract_str(c: &mut Criterion) {
    let text = sample_document(7);
    let mut group = c.benchmark_group("extract_str");
    group.throughput(Throughput::Bytes(text.len() as u64));
    for only_public in [false, true] {
        let extractor = Extractor::new("/", only_public, "md");
        group.bench_with_input(
            BenchmarkId::from_parameter(if only_public { "public" } else { "full" }),
            &text,
            |b, text| b.iter(|| extractor.extract_str("/doc7.md", text, ExtractMode::Full)),
        );
    }
    group.finish();
}

fn bench_sync_all(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let temp = TempDir::new().unwrap();
    write_tree(temp.path(), 200);

    let mut group = c.benchmark_group("sync_all");
    group.sample_size(10);
    group.throughput(Throughput::Elements(200));
    group.bench_function("cold_200", |b| {
        b.to_async(&rt).iter(|| async {
            let config = CoreConfig::new(temp.path());
            let db = DbConnection::connect_in_memory(false).await.unwrap();
            let vault = Vault::with_db(config, db, None).await.unwrap();
            vault.sync_all().await.unwrap()
        });
    });
    group.finish();
}

criterion_group!(benches, bench_extract_str, bench_sync_all);
criterion_main!(benches);
