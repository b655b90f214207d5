//! Reconciliation and page parsing throughput on realistic snapshot sizes

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use records_sync::application::{DeletionPolicy, normalize_snapshot, reconcile};
use records_sync::domain::{PersistedSet, Record};
use records_sync::infrastructure::{TablePageParser, TableSelectors};

fn snapshot(size: usize) -> Vec<Record> {
    (0..size)
        .map(|i| Record {
            office: "Chennai".into(),
            order_type: if i % 3 == 0 { "Appeal".into() } else { "Adjudication".into() },
            order_no: format!("{i}/2024"),
            order_date: Some("15/10/2024".into()),
            name_of_party: format!("Party {}", i % 500),
            ra_file_no: format!("RA-{i}"),
            attachment_url: Some(format!("https://portal.test/CP/files/{i}/order.pdf")),
            ..Record::default()
        })
        .collect()
}

fn bench_reconcile(c: &mut Criterion) {
    let mut group = c.benchmark_group("reconcile");
    for size in [1_000, 10_000, 50_000] {
        let current = snapshot(size);
        // 95% already persisted plus a handful of keys gone from the source
        let persisted: PersistedSet = snapshot(size + 50)
            .iter()
            .enumerate()
            .filter(|(i, _)| i % 20 != 0)
            .map(|(_, r)| r.natural_key())
            .collect();

        group.bench_with_input(BenchmarkId::from_parameter(size), &current, |b, current| {
            b.iter(|| reconcile(black_box(current), black_box(&persisted), DeletionPolicy::Detect));
        });
    }
    group.finish();
}

fn bench_parse_page(c: &mut Criterion) {
    let rows: String = (0..50)
        .map(|i| {
            format!(
                "<tr><td>Chennai</td><td>Adjudication</td><td>{i}/2024</td><td>15/10/2024</td>\
                 <td>Party {i}</td><td>RA-{i}</td><td><a href='/CP/files/{i}/order.pdf'>View</a></td></tr>"
            )
        })
        .collect();
    let markup = format!(
        "<table><tr><th>Office</th><th>Order Type</th><th>Order No.</th><th>Order Date</th>\
         <th>Name of Party</th><th>RA File No.</th><th>Attachment</th></tr>{rows}</table>"
    );
    let parser = TablePageParser::new(&TableSelectors::default(), Some("https://portal.test/")).unwrap();

    c.bench_function("parse_and_normalize_page", |b| {
        b.iter(|| {
            let raw = parser.parse_page(black_box(&markup)).unwrap();
            normalize_snapshot(&raw)
        });
    });
}

criterion_group!(benches, bench_reconcile, bench_parse_page);
criterion_main!(benches);
