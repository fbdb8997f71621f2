use async_stream::stream;
use futures::stream::{Stream, StreamExt};
use mdcs_core::{CrdtType, FieldKind, FieldValue};
use mdcs_db::{Collection, CollectionDefinition, Db, DbConfig, DocId, Result};
use mdcs_store::MemoryStore;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{Duration, Instant};
use tracing::info;

/// Statistics collected during a convergence run.
#[derive(Clone, Debug)]
pub struct StressTestStats {
    pub num_replicas: usize,
    pub writes_per_replica: usize,
    pub total_syncs: usize,
    pub total_merges: usize,
    pub total_time: Duration,
    pub avg_sync_time: Duration,
    pub converged: bool,
}

impl StressTestStats {
    pub fn print(&self) {
        println!("\n╔════════════════════════════════════════════════════════════╗");
        println!("║              Convergence Run Statistics                    ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║  Number of Replicas:        {:>30} ║", self.num_replicas);
        println!("║  Writes per Replica:        {:>30} ║", self.writes_per_replica);
        println!("║  Sync Rounds:               {:>30} ║", self.total_syncs);
        println!("║  Merges:                    {:>30} ║", self.total_merges);
        println!("║  Total Time:                {:>29}s ║", format!("{:.3}", self.total_time.as_secs_f64()));
        println!("║  Average Sync Time:         {:>28}µs ║", self.avg_sync_time.as_micros());
        println!("║  Converged:                 {:>30} ║", self.converged);
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

pub fn players() -> CollectionDefinition {
    CollectionDefinition::new(1, "Player")
        .with_field("name", FieldKind::String, CrdtType::LwwRegister)
        .with_field("level", FieldKind::Int, CrdtType::LwwRegister)
        .with_field("score", FieldKind::Int, CrdtType::PNCounter)
        .with_index("name")
}

/// Yields (from, to) replica pairs to synchronize.
fn replica_sync_generator(num_replicas: usize, num_syncs: usize) -> impl Stream<Item = (usize, usize)> {
    stream! {
        let mut rng = StdRng::from_entropy();
        for _ in 0..num_syncs {
            let from = rng.gen_range(0..num_replicas);
            let to = rng.gen_range(0..num_replicas);
            yield (from, to);
        }
    }
}

/// Copy every block `from` holds to `to`, then merge `from`'s heads of each
/// document. Returns the number of merges run.
pub async fn sync_pair(from: &Db, to: &Db, docs: &[DocId]) -> Result<usize> {
    for (_, bytes) in from.blocks()? {
        to.put_block(bytes)?;
    }
    let source = from.collection("Player")?;
    let mut requests = Vec::new();
    for id in docs {
        for head in source.heads(id)? {
            requests.push((head, source.schema_root().to_string()));
        }
    }
    let merges = requests.len();
    for result in to.merge_all(requests).await {
        result?;
    }
    Ok(merges)
}

fn random_write(players: &Collection, id: &DocId, rng: &mut StdRng) -> Result<()> {
    let Some(mut doc) = players.get(id)? else {
        return Ok(());
    };
    let def = players.definition();
    match rng.gen_range(0..3) {
        0 => doc.set(def, "level", rng.gen_range(1i64..100))?,
        1 => doc.set(def, "score", rng.gen_range(-5i64..20))?,
        _ => doc.set(def, "name", format!("player-{}", rng.gen_range(0..1000)))?,
    }
    players.update(&mut doc)?;
    Ok(())
}

/// Run random writes on every replica while random pairs exchange history,
/// then fully synchronize and check every replica projects the same documents.
pub async fn stress_test_convergence(
    num_replicas: usize,
    num_docs: usize,
    writes_per_replica: usize,
    num_syncs: usize,
) -> Result<StressTestStats> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║        Document Convergence Run                            ║");
    println!("║  Replicas: {} | Docs: {} | Writes/Replica: {} | Syncs: {}",
             num_replicas, num_docs, writes_per_replica, num_syncs);
    println!("╚════════════════════════════════════════════════════════════╝");

    let start = Instant::now();
    let mut replicas = Vec::with_capacity(num_replicas);
    for _ in 0..num_replicas {
        let db = Db::new(MemoryStore::new(), DbConfig::default())?;
        db.add_collection(players())?;
        replicas.push(db);
    }

    // documents start on the first replica and reach the others by syncing
    let seed = replicas[0].collection("Player")?;
    let mut docs = Vec::with_capacity(num_docs);
    for i in 0..num_docs {
        let mut doc = seed.new_document([
            ("name", FieldValue::from(format!("player-{}", i))),
            ("level", FieldValue::Int(1)),
            ("score", FieldValue::Int(0)),
        ])?;
        seed.create(&mut doc)?;
        docs.push(doc.id().clone());
    }

    println!("\n[Phase 1/3] Writing and exchanging history...");
    let mut rng = StdRng::from_entropy();
    let mut sync_times = Vec::new();
    let mut total_syncs = 0;
    let mut total_merges = 0;
    let mut sync_gen = Box::pin(replica_sync_generator(num_replicas, num_syncs));
    let mut written = 0;
    while let Some((from, to)) = sync_gen.next().await {
        if written < writes_per_replica {
            for db in &replicas {
                let players = db.collection("Player")?;
                let id = &docs[rng.gen_range(0..docs.len())];
                random_write(&players, id, &mut rng)?;
            }
            written += 1;
        }
        if from == to {
            continue;
        }
        let sync_start = Instant::now();
        total_merges += sync_pair(&replicas[from], &replicas[to], &docs).await?;
        sync_times.push(sync_start.elapsed());
        total_syncs += 1;
        if total_syncs % 50 == 0 {
            info!(total_syncs, total_merges, "sync progress");
        }
    }
    println!("[Phase 1/3] ✓ Completed");

    println!("[Phase 2/3] Full synchronization...");
    for from in 0..num_replicas {
        for to in 0..num_replicas {
            if from != to {
                total_merges += sync_pair(&replicas[from], &replicas[to], &docs).await?;
            }
        }
    }
    println!("[Phase 2/3] ✓ Completed");

    println!("[Phase 3/3] Checking convergence...");
    let mut converged = true;
    let reference = replicas[0].collection("Player")?;
    for db in &replicas[1..] {
        let players = db.collection("Player")?;
        for id in &docs {
            if players.get(id)? != reference.get(id)? || players.heads(id)? != reference.heads(id)? {
                converged = false;
            }
        }
    }
    println!("[Phase 3/3] ✓ Completed");

    let avg_sync_time = if sync_times.is_empty() {
        Duration::ZERO
    } else {
        sync_times.iter().sum::<Duration>() / sync_times.len() as u32
    };

    Ok(StressTestStats {
        num_replicas,
        writes_per_replica,
        total_syncs,
        total_merges,
        total_time: start.elapsed(),
        avg_sync_time,
        converged,
    })
}

/// Convergence runs at increasing replica counts.
pub async fn stress_test_scaling(max_replicas: usize, step_size: usize) -> Result<()> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║      Scaling Analysis - Merge Cost vs Replicas             ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let mut current = step_size;
    while current <= max_replicas {
        let stats = stress_test_convergence(current, 4, 10, current * 10).await?;
        stats.print();
        current += step_size;
    }
    Ok(())
}
