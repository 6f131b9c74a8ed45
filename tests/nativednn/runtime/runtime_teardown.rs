use anyhow::Result;
use nativednn::{
    DnnError, ExecParams, Frame, FunctionType, ModelHooks, ModelOptions, NativeModel, PixelFormat,
};

use crate::common;

fn request(tag: u8) -> ExecParams {
    ExecParams::new("x", "y", common::gray_frame(2, 2, &[tag; 4]))
        .with_out_frame(Frame::new(2, 2, PixelFormat::Gray8))
}

#[test]
fn teardown_with_nothing_submitted() -> Result<()> {
    let (model, executor) = common::deferred_model(&common::identity_model(), 3)?;
    let accounting = model.buffer_accounting();
    model.free();
    assert_eq!(executor.pending(), 0);
    assert_eq!(accounting.allocated(), 0);
    assert_eq!(accounting.released(), 0);
    Ok(())
}

#[test]
fn teardown_waits_for_one_in_flight() -> Result<()> {
    let (model, executor) = common::deferred_model(&common::identity_model(), 1)?;
    let accounting = model.buffer_accounting();
    model.execute(request(5))?;
    assert_eq!(accounting.live(), 1);
    assert_eq!(executor.pending(), 1);

    drop(model);
    assert_eq!(executor.pending(), 0);
    assert_eq!(accounting.allocated(), 2);
    assert_eq!(accounting.released(), accounting.allocated());
    Ok(())
}

#[test]
fn teardown_with_many_items() -> Result<()> {
    let (model, executor) = common::deferred_model(&common::scale_model(), 2)?;
    let accounting = model.buffer_accounting();

    model.execute(request(1))?;
    executor.run_all();
    model.execute(request(2))?;
    model.execute(request(3))?;
    assert!(matches!(model.execute(request(4)), Err(DnnError::NoRequestSlot)));
    assert!(matches!(model.execute(request(5)), Err(DnnError::NoRequestSlot)));
    assert_eq!(model.pending_tasks(), 5);
    assert_eq!(model.pending_inferences(), 2);
    assert!(accounting.live() > 0);

    model.free();
    assert_eq!(executor.pending(), 0);
    assert_eq!(accounting.released(), accounting.allocated());
    Ok(())
}

#[test]
fn teardown_after_failures() -> Result<()> {
    let (model, executor) = common::deferred_model(&common::failing_model(), 2)?;
    let accounting = model.buffer_accounting();
    model.execute(request(1))?;
    executor.run_all();
    model.execute(request(2))?;
    drop(model);
    assert_eq!(accounting.released(), accounting.allocated());

    let model = common::sync_model(&common::failing_model())?;
    let accounting = model.buffer_accounting();
    assert!(model.execute(request(3)).is_err());
    drop(model);
    assert_eq!(accounting.released(), accounting.allocated());
    Ok(())
}

#[test]
fn teardown_on_thread_pool() -> Result<()> {
    let options = ModelOptions {
        threads: 2,
        ..ModelOptions::default()
    }
    .with_nireq(3);
    let model = NativeModel::from_bytes(
        &common::scale_model(),
        FunctionType::Process,
        options,
        ModelHooks::default(),
    )?;
    let accounting = model.buffer_accounting();
    for tag in 0..6 {
        let _ = model.execute(request(tag));
    }
    drop(model);
    assert_eq!(accounting.released(), accounting.allocated());
    Ok(())
}
