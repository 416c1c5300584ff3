use envelope_core::client::rust::stream::SealerStreamConfig;
use envelope_core::client::rust::SealerMemoryConfig;
use envelope_core::client::{RecipientSet, Sealer, SigningOptions};
use envelope_core::config::EnvelopeConfig;
use envelope_core::keys::KeyPair;

use envelope_core::test::TestSetup;
use rand::{CryptoRng, RngCore};
use std::io::Cursor;

use criterion::*;

// For small payloads the key encapsulation per recipient outweighs the symmetric encryption.
fn bench_seal_stream<Rng: RngCore + CryptoRng>(
    plain: &[u8],
    recipients: &RecipientSet,
    signer: &KeyPair,
    rng: &mut Rng,
) {
    Sealer::<_, SealerStreamConfig>::new(&EnvelopeConfig::default(), recipients, rng)
        .unwrap()
        .with_signing(SigningOptions::sign_then_encrypt(&signer.private_key))
        .with_data_size(plain.len() as u64)
        .seal(Cursor::new(plain), std::io::sink())
        .unwrap();
}

fn bench_seal_memory<Rng: RngCore + CryptoRng>(
    plain: &[u8],
    recipients: &RecipientSet,
    rng: &mut Rng,
) -> Vec<u8> {
    Sealer::<_, SealerMemoryConfig>::new(&EnvelopeConfig::default(), recipients, rng)
        .unwrap()
        .with_padding(true)
        .seal(plain)
        .unwrap()
}

fn rand_vec(length: usize) -> Vec<u8> {
    (0..length).map(|_| rand::random::<u8>()).collect()
}

fn bench(c: &mut Criterion) {
    let _ = env_logger::builder().is_test(true).try_init();

    let mut rng = rand::thread_rng();
    let setup = TestSetup::new(&mut rng);

    let keys: Vec<_> = setup
        .recipients
        .iter()
        .map(|kp| kp.public_key.clone())
        .collect();
    let recipients = RecipientSet::from(&keys[..]);
    let signer = &setup.signers[0];

    let mut group = c.benchmark_group("throughput-seal");
    group.sample_size(10);

    for blen in [10, 14, 18, 22, 26] {
        let input = rand_vec(1 << blen);
        group.throughput(Throughput::Bytes(input.len() as u64));
        group.bench_function(format!("seal stream {} KiB", input.len() / 1024), |b| {
            b.iter(|| bench_seal_stream(&input, &recipients, signer, &mut rng))
        });
        group.bench_function(format!("seal memory {} KiB", input.len() / 1024), |b| {
            b.iter(|| bench_seal_memory(&input, &recipients, &mut rng))
        });
    }

    group.finish();
}

criterion_group!(benches, bench);
criterion_main!(benches);
