use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};

use jpeg_tilecodec::{
    build_metadata, quantization_table_name, read_metadata, JpegWriter, ParameterList,
    PixelTile, QuantizationTable, TileEncoder, TileLayout, WRITE_JFIF_HEADER,
};

fn params() -> ParameterList {
    let mut params = ParameterList::jpeg_defaults().with(WRITE_JFIF_HEADER, false);
    params.set(&quantization_table_name(0), QuantizationTable::ANNEX_K_LUMA);
    params.set(&quantization_table_name(1), QuantizationTable::ANNEX_K_CHROMA);
    params.set(&quantization_table_name(2), QuantizationTable::ANNEX_K_CHROMA);
    params
}

fn metadata(c: &mut Criterion) {
    let writer = JpegWriter::new();
    let params = params();
    let layout = TileLayout::new(256, 256, 3);
    c.bench_function("build_metadata", |b| {
        b.iter(|| build_metadata(&writer, black_box(&params), Some(&layout)).unwrap())
    });

    let data = (0..256 * 256 * 3).map(|i| (i % 251) as u8).collect::<Vec<_>>();
    let tile = PixelTile::new(256, 256, 3, data).unwrap();
    let mut jpeg = Vec::new();
    TileEncoder::default()
        .encode(Some(&tile), &params, &mut jpeg)
        .unwrap();

    let mut group = c.benchmark_group("read_metadata");
    group.throughput(Throughput::Bytes(jpeg.len() as u64));
    group.bench_function("256x256", |b| {
        b.iter(|| read_metadata(black_box(&jpeg)).unwrap())
    });
    group.finish();
}

criterion_group!(benches, metadata);
criterion_main!(benches);
