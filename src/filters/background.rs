use crate::config::WienerSettings;
use crate::data_container::ImageData;
use crate::error::DeconvolutionError;
use crate::filters::filter::{Filter, FilterConfig, FilterDomain};

/// Subtracts a constant background level from every pixel, clamping at zero.
#[derive(Debug, Clone)]
pub struct BackgroundSubtraction;

impl Filter for BackgroundSubtraction {
    fn new() -> Self {
        BackgroundSubtraction
    }

    fn config(&self) -> FilterConfig {
        FilterConfig {
            name: "Background Subtraction".to_string(),
            description: "Subtracts a constant background level and clips negative values to 0."
                .to_string(),
            hyperlink: None,
            domain: FilterDomain::Spatial,
        }
    }

    fn filter(
        &self,
        input: &ImageData,
        settings: &WienerSettings,
    ) -> Result<ImageData, DeconvolutionError> {
        let background = settings.background_subtraction;
        if !background.is_finite() || background < 0.0 {
            return Err(DeconvolutionError::parameter(
                "background_subtraction",
                background,
                "must be zero or positive",
            ));
        }
        if background == 0.0 {
            return Ok(input.clone());
        }
        Ok(input.with_data(input.data.mapv(|v| (v - background).max(0.0))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn settings(background_subtraction: f64) -> WienerSettings {
        WienerSettings {
            background_subtraction,
            ..WienerSettings::default()
        }
    }

    #[test]
    fn test_subtracts_and_clamps() {
        let input = ImageData::new("beads", array![[5.0, 120.0], [99.0, 100.0]]);
        let output = BackgroundSubtraction
            .filter(&input, &settings(100.0))
            .unwrap();
        assert_eq!(output.data, array![[0.0, 20.0], [0.0, 0.0]]);
        assert_eq!(output.name, "beads");
    }

    #[test]
    fn test_zero_background_is_identity() {
        let input = ImageData::new("beads", array![[-1.0, 3.5]]);
        let output = BackgroundSubtraction
            .filter(&input, &settings(0.0))
            .unwrap();
        assert_eq!(output, input);
    }

    #[test]
    fn test_negative_background_is_rejected() {
        let input = ImageData::new("beads", array![[1.0]]);
        let result = BackgroundSubtraction.filter(&input, &settings(-2.0));
        assert!(matches!(
            result,
            Err(DeconvolutionError::InvalidParameter {
                name: "background_subtraction",
                ..
            })
        ));
    }
}
