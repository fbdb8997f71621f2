use mdcs_core::FieldValue;
use mdcs_db::{Db, DbConfig, Event};
use mdcs_store::MemoryStore;
use stress_test::{players, stress_test_convergence, stress_test_scaling, sync_pair};
use tracing::info;
use tracing_subscriber::EnvFilter;

pub mod stress_test;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async_main())
}

async fn async_main() -> Result<(), Box<dyn std::error::Error>> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║            THREE-REPLICA WALKTHROUGH                       ║");
    println!("╚════════════════════════════════════════════════════════════╝");
    walkthrough().await?;

    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            CONVERGENCE RUNS                                ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let stats = stress_test_convergence(3, 4, 20, 60).await?;
    stats.print();

    let stats = stress_test_convergence(6, 8, 40, 200).await?;
    stats.print();

    stress_test_scaling(8, 2).await?;

    println!("\n✓ All runs completed");
    Ok(())
}

fn replica() -> mdcs_db::Result<Db> {
    let db = Db::new(MemoryStore::new(), DbConfig::default())?;
    db.add_collection(players())?;
    Ok(db)
}

/// Alice, Bob and Carol edit one document concurrently and converge.
async fn walkthrough() -> Result<(), Box<dyn std::error::Error>> {
    let (alice, bob, carol) = (&replica()?, &replica()?, &replica()?);

    let mut events = carol.subscribe();

    let players_a = alice.collection("Player")?;
    let mut doc = players_a.new_document([
        ("name", FieldValue::from("ada")),
        ("level", FieldValue::Int(1)),
        ("score", FieldValue::Int(0)),
    ])?;
    players_a.create(&mut doc)?;
    let id = doc.id().clone();
    info!(doc_id = %id, "alice created the document");

    sync_pair(alice, bob, std::slice::from_ref(&id)).await?;

    // concurrent edits: bob levels up, alice renames and scores
    let players_b = bob.collection("Player")?;
    let mut on_bob = players_b.get(&id)?.ok_or("document missing on bob")?;
    on_bob.set(players_b.definition(), "level", 2i64)?;
    on_bob.set(players_b.definition(), "score", 10i64)?;
    players_b.update(&mut on_bob)?;

    doc.set(players_a.definition(), "name", "ada lovelace")?;
    doc.set(players_a.definition(), "score", 5i64)?;
    players_a.update(&mut doc)?;

    sync_pair(bob, carol, std::slice::from_ref(&id)).await?;
    sync_pair(alice, carol, std::slice::from_ref(&id)).await?;

    let players_c = carol.collection("Player")?;
    println!("  carol sees {} head(s)", players_c.heads(&id)?.len());

    while let Ok(event) = events.try_recv() {
        if let Event::Update(update) = event {
            println!("  carol merged {} (create: {})", update.cid.short(), update.is_create);
        }
    }

    // carol writes on top of both branches
    let mut on_carol = players_c.get(&id)?.ok_or("document missing on carol")?;
    on_carol.set(players_c.definition(), "level", 3i64)?;
    players_c.update(&mut on_carol)?;

    for peer in [alice, bob] {
        sync_pair(carol, peer, std::slice::from_ref(&id)).await?;
    }

    for (name, db) in [("alice", alice), ("bob", bob), ("carol", carol)] {
        let players = db.collection("Player")?;
        let doc = players.get(&id)?.ok_or("document missing")?;
        println!(
            "  {:<6} heads={} name={:?} level={:?} score={:?}",
            name,
            players.heads(&id)?.len(),
            doc.get("name"),
            doc.get("level"),
            doc.get("score"),
        );
    }
    Ok(())
}
