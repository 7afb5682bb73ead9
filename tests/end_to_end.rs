use std::fs;

use dwi_qc::dataset_loader::InMemorySource;
use dwi_qc::{
    DatasetPaths, NiftiWriter, Orientation, PixmapRect, QcConfig, QcError, RescaleMode, Session,
    UiEvent, Volume,
};
use ndarray::{Array2, Array4, array};
use nifti::writer::WriterOptions;
use nifti::{NiftiHeader, NiftiType};

fn synthetic_source() -> InMemorySource {
    let volume = Volume::new(
        Array4::from_shape_fn((4, 4, 4, 5), |(x, y, z, d)| {
            (x * 16 + y * 4 + z) as f32 * (d + 1) as f32
        }),
        [2.0, 2.0, 2.0, 1.0],
    );
    InMemorySource {
        volume,
        b_values: vec![0.0, 1000.0, 1000.0, 1000.0, 1000.0],
        b_vectors: array![
            [0.0, 1.0, 0.0, 0.0, 0.7071],
            [0.0, 0.0, 1.0, 0.0, 0.7071],
            [0.0, 0.0, 0.0, 1.0, 0.0]
        ],
        paths: None,
    }
}

#[test]
fn test_exclusion_lifecycle() {
    let mut session = Session::new(QcConfig::default());
    session.load(&synthetic_source(), None).unwrap();

    session.handle(UiEvent::SelectDirection(2)).unwrap();
    session.handle(UiEvent::ExcludeCurrent).unwrap();
    assert_eq!(session.exclusions().unwrap().serialize(), vec![2]);

    session.handle(UiEvent::ExcludeCurrent).unwrap();
    assert_eq!(session.exclusions().unwrap().serialize(), vec![2]);

    session.handle(UiEvent::ClearExclusions).unwrap();
    assert_eq!(session.exclusions().unwrap().serialize(), Vec::<usize>::new());
}

#[test]
fn test_every_pane_renders_in_every_mode() {
    for mode in [
        RescaleMode::RobustPercentile,
        RescaleMode::ChannelMax,
        RescaleMode::twelve_bit(),
    ] {
        let config = QcConfig {
            rescale_mode: mode,
            ..QcConfig::default()
        };
        let mut session = Session::new(config);
        session.load(&synthetic_source(), None).unwrap();
        for orientation in Orientation::ALL {
            let image = session.render(orientation).unwrap();
            assert_eq!(image.dimensions(), (256, 256), "{mode:?} {orientation:?}");
        }
    }
}

#[test]
fn test_click_then_render_follows_position() {
    let mut session = Session::new(QcConfig::default());
    session.load(&synthetic_source(), None).unwrap();

    let locator = session.locator(Orientation::Coronal).unwrap();
    let rect = PixmapRect::at_origin(locator.pixmap_size());
    let point = locator.to_display((3, 1));
    let redraw = session
        .handle(UiEvent::Click {
            orientation: Orientation::Coronal,
            point,
            rect,
        })
        .unwrap();

    // Coronal spans X and Z; Y stays where it was.
    assert_eq!(session.position(), Some([3, 2, 1]));
    assert!(redraw.panes.contains(&Orientation::Axial));
    assert!(redraw.panes.contains(&Orientation::Sagittal));
    assert!(!redraw.panes.contains(&Orientation::Coronal));
}

#[test]
fn test_unload_discards_exclusions() {
    let mut session = Session::new(QcConfig::default());
    session.load(&synthetic_source(), None).unwrap();
    session
        .handle(UiEvent::EditExclusions("[1, 3]".into()))
        .unwrap();

    session.load(&synthetic_source(), None).unwrap();
    assert_eq!(session.exclusion_text(), "[]");

    session.handle(UiEvent::Unload).unwrap();
    assert!(!session.is_loaded());
    assert!(matches!(
        session.handle(UiEvent::ClearExclusions),
        Err(QcError::NoDataset)
    ));
}

#[test]
fn test_nifti_load_and_save() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("dwi.nii");
    let bvals = dir.path().join("dwi.bvals");
    let bvecs = dir.path().join("dwi.bvecs");

    let data = Array4::from_shape_fn((3, 3, 2, 4), |(x, y, z, d)| (x + y + z + 10 * d) as f32);
    WriterOptions::new(&image).write_nifti(&data).unwrap();
    fs::write(&bvals, "0 1000 1000 1000\n").unwrap();
    fs::write(&bvecs, "0 1 0 0\n0 0 1 0\n0 0 0 1\n").unwrap();

    let mut session = Session::new(QcConfig::default());
    session
        .load_from_paths(DatasetPaths::new(&image, &bvals, &bvecs), None)
        .unwrap();
    assert_eq!(session.dataset().unwrap().volume().dim(), (3, 3, 2, 4));
    assert_eq!(session.dataset().unwrap().volume().data()[[2, 1, 1, 3]], 34.0);

    let original = fs::read(&image).unwrap();
    session
        .handle(UiEvent::EditExclusions("[0, 2]".into()))
        .unwrap();
    let outcome = session.save(&NiftiWriter).unwrap().unwrap();
    assert_eq!(outcome.image, dir.path().join("dwi.exc.nii"));
    assert!(outcome.image.exists());
    assert_eq!(fs::read(&image).unwrap(), original);
    assert_eq!(fs::read_to_string(&outcome.b_values).unwrap(), "1000 1000\n");
    let log = fs::read_to_string(&outcome.log).unwrap();
    assert!(log.contains(&format!("new_nifti = {}\n", outcome.image.display())));

    let mut reloaded = Session::new(QcConfig::default());
    reloaded
        .load_from_paths(
            DatasetPaths::new(&outcome.image, &outcome.b_values, &outcome.b_vectors),
            None,
        )
        .unwrap();
    let volume = reloaded.dataset().unwrap().volume();
    assert_eq!(volume.dim(), (3, 3, 2, 2));
    assert_eq!(volume.data()[[2, 1, 1, 1]], 34.0);
    assert_eq!(
        reloaded.dataset().unwrap().directions().b_vectors(),
        &Array2::from_shape_vec((3, 2), vec![1.0, 0.0, 0.0, 0.0, 0.0, 1.0]).unwrap()
    );
}

#[test]
fn test_saved_copy_keeps_input_datatype() {
    let dir = tempfile::tempdir().unwrap();
    let image = dir.path().join("scan.nii");
    let bvals = dir.path().join("scan.bvals");
    let bvecs = dir.path().join("scan.bvecs");

    let data = Array4::from_shape_fn((2, 2, 2, 3), |(x, y, z, d)| {
        (x + y + z) as i16 * 100 - d as i16
    });
    WriterOptions::new(&image).write_nifti(&data).unwrap();
    fs::write(&bvals, "0 1000 1000\n").unwrap();
    fs::write(&bvecs, "0 1 0\n0 0 1\n0 0 0\n").unwrap();

    let mut session = Session::new(QcConfig::default());
    session
        .load_from_paths(DatasetPaths::new(&image, &bvals, &bvecs), None)
        .unwrap();
    session
        .handle(UiEvent::EditExclusions("[1]".into()))
        .unwrap();
    let outcome = session.save(&NiftiWriter).unwrap().unwrap();

    let header = NiftiHeader::from_file(&outcome.image).unwrap();
    assert_eq!(header.datatype, NiftiType::Int16 as i16);
    assert_eq!(NiftiHeader::from_file(&image).unwrap().dim[4], 3);

    let mut reloaded = Session::new(QcConfig::default());
    reloaded
        .load_from_paths(
            DatasetPaths::new(&outcome.image, &outcome.b_values, &outcome.b_vectors),
            None,
        )
        .unwrap();
    let volume = reloaded.dataset().unwrap().volume();
    assert_eq!(volume.dim(), (2, 2, 2, 2));
    assert_eq!(volume.data()[[1, 1, 1, 1]], 298.0);
}
