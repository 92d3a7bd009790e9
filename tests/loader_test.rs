use std::fs;
use std::path::Path;
use std::sync::Arc;

use rust_decimal_macros::dec;
use tempfile::TempDir;

use freight_quote::domain::{AccessorialKind, Mode, ZoneKey, ZonePair};
use freight_quote::engine::{RateRepository, Readiness, SnapshotError};
use freight_quote::infra::loader::{self, LoadError};
use freight_quote::util::logging;

fn write(dir: &Path, file: &str, contents: &str) {
    fs::write(dir.join(file), contents).unwrap();
}

fn full_dataset() -> TempDir {
    logging::init_test();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path();
    write(
        path,
        loader::ZIP_ZONES,
        "Zipcode,Dest Zone,BEYOND\n30301,1,N\n60601,3,N\n99501,9,Y\n",
    );
    write(
        path,
        loader::ZONE_RATES,
        "Rate Set,Mode,Origin Zone,Dest Zone,Max Weight,Rate\n\
         default,hotshot,1,3,500,150\n\
         default,hotshot,1,3,1000,\"$1,200.00\"\n\
         default,air,1,3,100,300\n",
    );
    write(
        path,
        loader::BEYOND_RATES,
        "Rate Set,Mode,Origin Zone,Dest Zone,Max Weight,Rate\ndefault,hotshot,1,9,1000,950\n",
    );
    write(
        path,
        loader::MILEAGE_RATES,
        "Rate Set,Mode,Band,Min Miles,Max Miles,Max Weight,Rate\n\
         default,hotshot,200-300,200,300,1000,180\n\
         default,hotshot,300-400,300.01,400,1000,220\n\
         default,air,0-1000,0,1000,1000,700\n",
    );
    write(
        path,
        loader::ACCESSORIALS,
        "Code,Name,Kind,Amount,Modes\n\
         liftgate,Liftgate,flat,75,hotshot\n\
         guarantee,Guaranteed Delivery,percent,25,air\n\
         inside,Inside Delivery,per_lb,0.05,hotshot|air\n",
    );
    write(
        path,
        loader::FUEL_SURCHARGES,
        "Mode,Fuel Rate\nhotshot,0.10\nair,0.20\n",
    );
    dir
}

#[test]
fn loads_complete_dataset() {
    let dir = full_dataset();
    let snapshot = loader::load_snapshot(dir.path(), 4).unwrap();

    assert_eq!(snapshot.version(), 4);
    let summary = snapshot.summary();
    assert_eq!(summary.zip_zones, 3);
    assert_eq!(summary.mileage_bands, 3);
    assert_eq!(summary.accessorials, 3);

    assert!(snapshot.zip_zone("99501").unwrap().beyond);
    assert_eq!(snapshot.fuel_rate(Mode::Air), Some(dec!(0.20)));

    let lookup = snapshot
        .lookup(
            Mode::Hotshot,
            "default",
            &ZoneKey::Standard(ZonePair::new(1, 3)),
            dec!(800),
        )
        .unwrap();
    assert_eq!(lookup.entry.base_rate, dec!(1200));

    let inside = snapshot.accessorials().get("INSIDE").unwrap();
    assert_eq!(inside.kind, AccessorialKind::PerPound);
    assert_eq!(inside.modes, vec![Mode::Hotshot, Mode::Air]);
    assert!(snapshot.missing_tables(Mode::Air).is_empty());
}

#[test]
fn reload_swaps_versions_and_keeps_old_snapshot_on_failure() {
    let dir = full_dataset();
    let repository = Arc::new(RateRepository::new());

    assert_eq!(loader::reload(&repository, dir.path()).unwrap(), 1);
    assert_eq!(loader::reload(&repository, dir.path()).unwrap(), 2);
    assert_eq!(repository.readiness(), Readiness::Ready { version: 2 });

    write(
        dir.path(),
        loader::ZIP_ZONES,
        "Zipcode,Dest Zone,BEYOND\n30301,1,N\n30301,2,N\n",
    );
    let error = loader::reload(&repository, dir.path()).unwrap_err();
    assert!(matches!(
        error,
        LoadError::Snapshot(SnapshotError::DuplicateZip(ref zip)) if zip == "30301"
    ));
    assert_eq!(repository.current_version(), Some(2));
}

#[test]
fn concurrent_reloads_publish_distinct_versions() {
    let dir = full_dataset();
    let repository = RateRepository::new();

    let mut versions: Vec<u64> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..4)
            .map(|_| {
                scope.spawn(|| {
                    (0..5)
                        .map(|_| loader::reload(&repository, dir.path()).unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        workers
            .into_iter()
            .flat_map(|worker| worker.join().unwrap())
            .collect()
    });
    versions.sort_unstable();

    assert_eq!(versions, (1..=20).collect::<Vec<u64>>());
    assert_eq!(repository.current_version(), Some(20));
}

#[test]
fn missing_tables_are_reported_not_fatal() {
    let dir = full_dataset();
    fs::remove_file(dir.path().join(loader::FUEL_SURCHARGES)).unwrap();
    fs::remove_file(dir.path().join(loader::MILEAGE_RATES)).unwrap();

    let repository = RateRepository::new();
    loader::reload(&repository, dir.path()).unwrap();

    match repository.readiness() {
        Readiness::NotReady { missing } => assert_eq!(
            missing,
            vec![
                "fuel_surcharges (hotshot)".to_string(),
                "fuel_surcharges (air)".to_string()
            ]
        ),
        other => panic!("expected not ready, got {other:?}"),
    }
}

#[test]
fn reordered_columns_are_rejected() {
    let dir = full_dataset();
    write(
        dir.path(),
        loader::FUEL_SURCHARGES,
        "Fuel Rate,Mode\n0.10,hotshot\n",
    );

    match loader::load_snapshot(dir.path(), 1).unwrap_err() {
        LoadError::Columns {
            file,
            expected,
            found,
        } => {
            assert_eq!(file, loader::FUEL_SURCHARGES);
            assert_eq!(expected, vec!["Mode", "Fuel Rate"]);
            assert_eq!(found, vec!["Fuel Rate", "Mode"]);
        }
        other => panic!("expected column error, got {other}"),
    }
}

#[test]
fn unknown_mode_and_overlapping_bands_are_rejected() {
    let dir = full_dataset();
    write(
        dir.path(),
        loader::ACCESSORIALS,
        "Code,Name,Kind,Amount,Modes\nliftgate,Liftgate,flat,75,hotshot|ground\n",
    );
    assert!(matches!(
        loader::load_snapshot(dir.path(), 1).unwrap_err(),
        LoadError::Value { field: "modes", line: 2, .. }
    ));

    let dir = full_dataset();
    write(
        dir.path(),
        loader::MILEAGE_RATES,
        "Rate Set,Mode,Band,Min Miles,Max Miles,Max Weight,Rate\n\
         default,hotshot,A,0,300,1000,180\n\
         default,hotshot,B,250,400,1000,220\n",
    );
    assert!(matches!(
        loader::load_snapshot(dir.path(), 1).unwrap_err(),
        LoadError::Snapshot(SnapshotError::OverlappingBands { .. })
    ));
}

#[test]
fn negative_rates_are_rejected() {
    let dir = full_dataset();
    write(
        dir.path(),
        loader::BEYOND_RATES,
        "Rate Set,Mode,Origin Zone,Dest Zone,Max Weight,Rate\ndefault,hotshot,1,9,1000,-950\n",
    );
    assert!(matches!(
        loader::load_snapshot(dir.path(), 1).unwrap_err(),
        LoadError::Snapshot(SnapshotError::NegativeAmount { .. })
    ));
}
