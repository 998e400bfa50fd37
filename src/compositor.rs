use crate::{
    foundation::error::{SpliceError, SpliceResult},
    raster::Raster,
    source::Source,
    target::Target,
    warp::WarpEngine,
};

/// Composite `source` onto the quadrilateral of `target`.
///
/// `target` must already be canonicalized. The output always has the target raster's
/// dimensions; the source is stretched to the quad's bounding box, warped into the quad and
/// drawn over the target with alpha-over.
///
/// `source` is consumed; `target` is only read.
#[tracing::instrument(skip_all, fields(engine = engine.name()))]
pub fn composite(
    mut source: Source,
    target: &Target,
    engine: &dyn WarpEngine,
) -> SpliceResult<Raster> {
    if !target.is_canonical() {
        return Err(SpliceError::geometry(
            "target bounds must be canonicalized before compositing",
        ));
    }
    let b = target.bounding_box();
    let (w, h) = b.raster_size()?;

    source.resize_to(w, h)?;
    source.warp_to_quadrilateral(target.quad(), &b, engine)?;
    let warped = source.into_raster();

    let (tw, th) = target.raster().dimensions();
    let mut out = Raster::new(tw, th);
    out.draw_src_at(target.raster(), 0, 0);
    out.draw_over_at(&warped, b.min_x, b.min_y);
    Ok(out)
}

/// One-shot still-image splice: canonicalize, then composite once.
///
/// Every error is fatal on this path.
pub fn splice_still(
    source: Raster,
    target: &mut Target,
    engine: &dyn WarpEngine,
) -> SpliceResult<Raster> {
    if source.is_empty() {
        return Err(SpliceError::input("source raster is empty"));
    }
    if target.raster().is_empty() {
        return Err(SpliceError::input("target raster is empty"));
    }
    target.canonicalize_bounds()?;
    target.bounding_box().raster_size()?;
    composite(Source::new(source), target, engine)
}
