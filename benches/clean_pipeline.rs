use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use retail_warehouse::cast::cast_entity;
use retail_warehouse::clean::clean_entity;
use retail_warehouse::entity::Entity;
use retail_warehouse::record_set::RecordSet;

const PRODUCT_HEADERS: &[&str] = &[
    "product_name",
    "product_price",
    "weight",
    "category",
    "EAN",
    "date_added",
    "uuid",
    "removed",
    "product_code",
];

fn generate_products(rows: usize) -> RecordSet {
    let weights = ["1.6kg", "200g", "3 x 100g", "77g .", "5lbs", "500ml", "12oz"];
    let availability = ["Still_available", "Still_avaliable", "Removed", "NULL"];
    let data = (0..rows)
        .map(|i| {
            vec![
                Some(format!("Product {i}")),
                Some(format!("£{}.{:02}", i % 200, i % 100)),
                Some(weights[i % weights.len()].to_string()),
                Some(if i % 11 == 0 { "4U1SO6HGM" } else { "homeware" }.to_string()),
                Some(format!("{:013}", i)),
                Some(if i % 2 == 0 { "2005-12-02" } else { "Feb 13 1990" }.to_string()),
                Some(format!("83dc0a69-f96f-4c34-bcb7-{:012x}", i)),
                Some(availability[i % availability.len()].to_string()),
                Some(format!("R7-{i:07}h")),
            ]
        })
        .collect();
    RecordSet::from_text_rows(PRODUCT_HEADERS, data).expect("product records")
}

fn bench_clean_and_cast(c: &mut Criterion) {
    let raw = generate_products(20_000);
    let mut group = c.benchmark_group("product_pipeline");

    group.bench_function("clean", |b| {
        b.iter_batched(
            || raw.clone(),
            |records| clean_entity(Entity::Product, records).expect("clean products"),
            BatchSize::LargeInput,
        );
    });

    let cleaned = clean_entity(Entity::Product, raw.clone())
        .expect("clean products")
        .records;
    group.bench_function("cast", |b| {
        b.iter_batched(
            || cleaned.clone(),
            |records| cast_entity(Entity::Product, records).expect("cast products"),
            BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_clean_and_cast);
criterion_main!(benches);
