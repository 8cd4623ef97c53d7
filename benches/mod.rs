use criterion::{criterion_group, criterion_main};


criterion_group!(
    benches,
    network::application::mqtt::session::bench_reassemble,
    network::application::mqtt::session::bench_queue,
    network::application::mqtt::session::bench_inbound_qos1,
    network::application::mqtt::session::bench_publish_qos0
);
criterion_main!(benches);
