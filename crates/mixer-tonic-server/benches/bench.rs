use core::{fmt, hint::black_box};
use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use futures::stream::FuturesUnordered;
use mixer_tonic_core::{
    attribute::encode,
    mixer::{Dictionary, MutableBag},
    proto::{CheckRequest, mixer_client::MixerClient},
};
use std::{
    net::TcpStream,
    process::{Command, Stdio},
    thread,
    time::{Duration, Instant},
};
use tokio::runtime::Builder;
use tokio_stream::StreamExt;
use tonic::{
    codec::CompressionEncoding,
    transport::{Channel, Uri},
};

#[derive(Clone, Copy, Debug)]
enum Compression {
    None,
    Deflate,
    Gzip,
    Zstd,
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compression::None => write!(f, "none"),
            Compression::Deflate => write!(f, "deflate"),
            Compression::Gzip => write!(f, "gzip"),
            Compression::Zstd => write!(f, "zstd"),
        }
    }
}

impl From<Compression> for Option<CompressionEncoding> {
    fn from(value: Compression) -> Self {
        match value {
            Compression::None => None,
            Compression::Deflate => Some(CompressionEncoding::Deflate),
            Compression::Gzip => Some(CompressionEncoding::Gzip),
            Compression::Zstd => Some(CompressionEncoding::Zstd),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct GrpcBenchParams {
    requests_per_stream: u64,
    concurrency: usize,
    compression: Compression,
}

/// Builds the requests of one stream: the first carries a full set of
/// attributes, the rest change a single one.
fn check_requests(count: u64) -> Vec<CheckRequest> {
    let dictionary = Dictionary::well_known();
    let mut bag = MutableBag::new();
    bag.set("source.name", "productpage");
    bag.set("source.namespace", "default");
    bag.set("destination.name", "reviews");
    bag.set("destination.namespace", "default");
    bag.set("request.path", "/reviews/0");
    bag.set("request.method", "GET");
    bag.set("request.size", 0_i64);
    bag.set("connection.mtls", true);

    let mut requests = Vec::with_capacity(count as usize);
    let mut names = bag.names();
    for request_index in 0..count as i64 {
        let attribute_update = encode(&bag, names.iter().map(String::as_str), &dictionary);
        requests.push(CheckRequest {
            request_index,
            attribute_update: Some(attribute_update),
        });
        bag.set("request.size", request_index + 1);
        names = vec!["request.size".to_string()];
    }
    bag.done();
    requests
}

fn grpc_bench(c: &mut Criterion) {
    let uri = Uri::try_from("http://127.0.0.1:50051").expect("Invalid URI");
    // Start the server. This may require a full compilation so set the timeout
    // high. Adjust features and CLI args to the server as necessary.
    let mut server = Command::new("cargo")
        .args([
            "run",
            "--bin",
            "mixer-server",
            "--release",
            "--features",
            "tracing",
            "--",
            "--num-workers",
            "128",
            "--server-addr",
            "127.0.0.1:50051",
        ])
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .spawn()
        .expect("Failed to start mixer-server");
    wait_for_port(uri.authority().expect("missing authority").as_str(), 300);

    let requests_per_stream_cases = [100, 1_000, 10_000];
    let concurrency_cases = [1, 4, 16, 64];
    let compression_cases = [
        Compression::None,
        Compression::Zstd,
        Compression::Gzip,
        Compression::Deflate,
    ];

    let mut cases = Vec::new();
    for &requests_per_stream in &requests_per_stream_cases {
        for &concurrency in &concurrency_cases {
            for &compression in &compression_cases {
                cases.push(GrpcBenchParams {
                    requests_per_stream,
                    concurrency,
                    compression,
                });
            }
        }
    }
    let rt = Builder::new_multi_thread().enable_all().build().unwrap();

    for params in &cases {
        let requests = check_requests(params.requests_per_stream);

        let mut group = c.benchmark_group("grpc/check");
        group.throughput(Throughput::Elements(
            params.requests_per_stream * params.concurrency as u64,
        ));

        group.bench_function(
            format!(
                "reqs/{}/conc/{}/comp/{}",
                params.requests_per_stream, params.concurrency, params.compression,
            ),
            |b| {
                b.to_async(&rt).iter_custom(|iters| {
                    let uri = uri.clone();
                    let requests = requests.clone();
                    async move {
                        let channel = Channel::builder(uri)
                            .connect()
                            .await
                            .expect("Failed to connect to server");

                        let start = Instant::now();

                        for _ in 0..iters {
                            run_grpc_check_bench(&channel, params, &requests).await;
                        }

                        start.elapsed()
                    }
                });
            },
        );

        group.finish();
    }

    if server.kill().is_err() {
        eprintln!("failed to kill server");
    }
}

async fn run_grpc_check_bench(
    channel: &Channel,
    params: &GrpcBenchParams,
    requests: &[CheckRequest],
) {
    let mut tasks = FuturesUnordered::new();

    for _ in 0..params.concurrency {
        let channel = channel.clone();
        let compression = params.compression;
        let requests = requests.to_vec();
        let expected = requests.len();

        tasks.push(tokio::spawn(async move {
            let mut client = MixerClient::new(channel);
            if let Some(encoding) = compression.into() {
                client = client.accept_compressed(encoding).send_compressed(encoding)
            }

            let mut stream = client
                .check(tokio_stream::iter(requests))
                .await
                .expect("check call failed")
                .into_inner();

            let mut received = 0;
            while let Some(resp) = stream.next().await {
                let resp = resp.expect("resp");
                assert!(resp.result.as_ref().is_some_and(|r| r.code == 0));
                black_box(resp);
                received += 1;
            }
            assert_eq!(received, expected, "missing responses");
        }));
    }

    while let Some(res) = tasks.next().await {
        res.unwrap();
    }
}

pub fn wait_for_port(addr: &str, timeout_secs: u64) {
    let start = Instant::now();
    while start.elapsed().as_secs() < timeout_secs {
        if TcpStream::connect(addr).is_ok() {
            return;
        }
        thread::sleep(Duration::from_millis(100));
    }
    panic!("Server did not start listening on {}", addr);
}

criterion_group!(grpc_benches, grpc_bench);
criterion_main!(grpc_benches);
