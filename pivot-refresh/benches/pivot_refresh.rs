//! FILENAME: benches/pivot_refresh.rs
//! Refresh throughput over a synthetic 10k-record sales snapshot.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use pivot_refresh::{
    null_evaluator, refresh_pivot, DataField, Function, PivotDefinition, PivotField, SourceCache,
};
use sheet_model::CellValue;

const RECORDS: usize = 10_000;

fn synthetic_cache() -> SourceCache {
    let months = [
        "Jan", "Feb", "Mar", "Apr", "May", "Jun", "Jul", "Aug", "Sep", "Oct", "Nov", "Dec",
    ];
    let products = ["CarRack", "SpeedBike", "Headlamp", "Pannier", "Bell"];
    let cities = ["Chicago", "Nashville", "Portland", "Seattle"];

    let rows: Vec<Vec<CellValue>> = (0..RECORDS)
        .map(|i| {
            vec![
                CellValue::text(months[i % months.len()]),
                CellValue::text(products[(i / 3) % products.len()]),
                CellValue::text(cities[(i / 7) % cities.len()]),
                CellValue::Number(((i % 97) as f64) * 4.25 + 10.0),
            ]
        })
        .collect();
    SourceCache::from_rows(&["Month", "Product", "City", "Total"], &rows)
}

fn rows_only_definition() -> PivotDefinition {
    let mut def = PivotDefinition::new((0, 0));
    def.row_fields.push(PivotField::new(0, "Month"));
    def.row_fields.push(PivotField::new(1, "Product"));
    def.data_fields.push(DataField::new(3, Function::Sum));
    def
}

fn matrix_definition() -> PivotDefinition {
    let mut def = PivotDefinition::new((0, 0));
    def.row_fields.push(PivotField::new(0, "Month"));
    def.row_fields.push(PivotField::new(1, "Product"));
    def.column_fields.push(PivotField::new(2, "City"));
    def.data_fields.push(DataField::new(3, Function::Sum));
    def.data_fields.push(DataField::new(3, Function::Average));
    def
}

fn bench_refresh(c: &mut Criterion) {
    let cache = synthetic_cache();
    let rows_def = rows_only_definition();
    let matrix_def = matrix_definition();

    c.bench_function("refresh_rows_10k", |b| {
        b.iter(|| {
            let out = refresh_pivot(black_box(&rows_def), black_box(&cache), &null_evaluator())
                .expect("refresh");
            black_box(out)
        })
    });

    c.bench_function("refresh_matrix_10k", |b| {
        b.iter(|| {
            let out = refresh_pivot(black_box(&matrix_def), black_box(&cache), &null_evaluator())
                .expect("refresh");
            black_box(out)
        })
    });

    c.bench_function("cache_build_10k", |b| {
        b.iter(|| black_box(synthetic_cache()))
    });
}

criterion_group!(benches, bench_refresh);
criterion_main!(benches);
