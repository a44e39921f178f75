use candle_core::{Result, Tensor};

/// Mean squared error over all the elements
///
/// loss = mean_i [ x(i) - xhat(i) ]^2
///
/// * `hat` - prediction
/// * `target` - observed data
///
pub fn mse_loss(hat: &Tensor, target: &Tensor) -> Result<Tensor> {
    hat.sub(target)?.sqr()?.mean_all()
}

/// Mean absolute error over all the elements
///
/// loss = mean_i | x(i) - xhat(i) |
///
/// * `hat` - prediction
/// * `target` - observed data
///
pub fn l1_loss(hat: &Tensor, target: &Tensor) -> Result<Tensor> {
    hat.sub(target)?.abs()?.mean_all()
}

/// Trapezoidal integral along the last dimension
///
/// int(..) = sum_j 0.5 * [ y(.., j) + y(.., j+1) ] * [ z(j+1) - z(j) ]
///
/// * `y` - profiles (.., d)
/// * `z` - grid points (d)
///
pub fn trapezoid_integral(y: &Tensor, z: &Tensor) -> Result<Tensor> {
    let last = y.rank() - 1;
    let d = y.dim(last)?;

    if d != z.dim(0)? {
        candle_core::bail!("profile length {} vs. grid length {}", d, z.dim(0)?);
    }
    if d < 2 {
        return y.sum(last)?.zeros_like();
    }

    let dz = z.narrow(0, 1, d - 1)?.sub(&z.narrow(0, 0, d - 1)?)?;
    let mid = ((y.narrow(last, 0, d - 1)? + y.narrow(last, 1, d - 1)?)? * 0.5)?;

    mid.broadcast_mul(&dz)?.sum(last)
}

/// Discrepancy between the height-integrated prediction and target,
/// i.e., how much total population mass each level gains or loses.
///
/// * `hat_ncd` - prediction (n x levels x depth)
/// * `target_ncd` - observed data (n x levels x depth)
/// * `z_d` - height grid (depth)
/// * `loss_fn` - fn (prediction, target) -> scalar loss
///
pub fn mass_conservation_loss<LossFn>(
    hat_ncd: &Tensor,
    target_ncd: &Tensor,
    z_d: &Tensor,
    loss_fn: &LossFn,
) -> Result<Tensor>
where
    LossFn: Fn(&Tensor, &Tensor) -> Result<Tensor>,
{
    let mass_hat = trapezoid_integral(hat_ncd, z_d)?;
    let mass_target = trapezoid_integral(target_ncd, z_d)?;
    loss_fn(&mass_hat, &mass_target)
}

#[test]
fn trapezoid_on_uneven_grid() -> Result<()> {
    let dev = candle_core::Device::Cpu;
    let y = Tensor::new(&[[1f32, 1., 1.], [0., 1., 2.]], &dev)?;
    let z = Tensor::new(&[0f32, 1., 3.], &dev)?;

    let area = trapezoid_integral(&y, &z)?.to_vec1::<f32>()?;
    assert_eq!(area, vec![3., 3.5]);

    let mass = mass_conservation_loss(&y, &y, &z, &mse_loss)?.to_scalar::<f32>()?;
    assert_eq!(mass, 0.);
    Ok(())
}
