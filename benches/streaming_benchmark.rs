use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use sheetstream::{CellInput, RowOpts, Workbook};
use tempfile::NamedTempFile;

fn int_row(row: u32, width: u32) -> Vec<CellInput> {
    (0..width).map(|col| (row * width + col).into()).collect()
}

fn benchmark_set_row(c: &mut Criterion) {
    let row = int_row(1, 10);

    c.bench_function("set_row_100x10", |b| {
        b.iter(|| {
            let wb = Workbook::new().unwrap();
            let mut writer = wb.new_stream_writer("Sheet1").unwrap();
            for r in 1..=100u32 {
                writer
                    .set_row(&format!("A{}", r), &row, RowOpts::default())
                    .unwrap();
            }
            black_box(writer.last_row());
        });
    });
}

fn benchmark_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");
    group.sample_size(10);

    for size in [1_000u32, 10_000, 100_000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let temp = NamedTempFile::new().unwrap();
                let mut wb = Workbook::new().unwrap();
                let mut writer = wb.new_stream_writer("Sheet1").unwrap();

                writer
                    .set_row(
                        "A1",
                        &["ID".into(), "Name".into(), "Value".into()],
                        RowOpts::default(),
                    )
                    .unwrap();
                for i in 0..size {
                    writer
                        .set_row(
                            &format!("A{}", i + 2),
                            &[i.into(), format!("Name_{}", i).into(), (i as f64 * 1.5).into()],
                            RowOpts::default(),
                        )
                        .unwrap();
                }

                writer.flush(&mut wb).unwrap();
                wb.save_as(temp.path()).unwrap();
            });
        });
    }

    group.finish();
}

fn benchmark_spill(c: &mut Criterion) {
    let mut group = c.benchmark_group("spill");
    group.sample_size(10);
    let row = int_row(1, 50);

    for threshold in [64 * 1024usize, usize::MAX].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(threshold),
            threshold,
            |b, &threshold| {
                b.iter(|| {
                    let mut wb = Workbook::new().unwrap();
                    let mut writer = wb.new_stream_writer("Sheet1").unwrap();
                    writer.set_spill_threshold(threshold);
                    for r in 1..=20_000u32 {
                        writer
                            .set_row(&format!("A{}", r), &row, RowOpts::default())
                            .unwrap();
                    }
                    writer.flush(&mut wb).unwrap();
                    black_box(wb.part("xl/worksheets/sheet1.xml").map(<[u8]>::len));
                });
            },
        );
    }

    group.finish();
}

fn benchmark_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("read");
    group.sample_size(10);

    for size in [1_000u32, 10_000, 100_000].iter() {
        let temp = NamedTempFile::new().unwrap();
        {
            let mut wb = Workbook::new().unwrap();
            let mut writer = wb.new_stream_writer("Sheet1").unwrap();
            for i in 1..=*size {
                writer
                    .set_row(
                        &format!("A{}", i),
                        &[i.into(), format!("Name_{}", i).into(), (i * 100).into()],
                        RowOpts::default(),
                    )
                    .unwrap();
            }
            writer.flush(&mut wb).unwrap();
            wb.save_as(temp.path()).unwrap();
        }

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                let wb = Workbook::open(temp.path()).unwrap();
                for row in wb.rows("Sheet1").unwrap() {
                    black_box(row.unwrap());
                }
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_set_row,
    benchmark_write,
    benchmark_spill,
    benchmark_read
);
criterion_main!(benches);
