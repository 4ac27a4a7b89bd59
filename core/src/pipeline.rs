use std::marker::PhantomData;

use ndarray::{Array1, Array2, Array3, Array4};
use serde::Serialize;

use crate::apex::ApexModel;
use crate::measurement::MeasurementSet;
use crate::prelude::{ResolveConfig, StageResult};
use crate::processing::{
    BinningStage, CellOutcome, ElectricFieldStage, FilterStage, GeodeticOutput, GeodeticStage,
    IntegrationPeriod, IntegrationStage, OutflowStage, TransformStage, VelocityStage,
};
use crate::telemetry::{LogManager, Metrics, MetricsRecorder};

/// Everything a run produces, indexed (period, bin[, component[, component]]).
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedVectors {
    /// Decimal year the apex model was evaluated at.
    pub epoch: f64,
    pub int_period: Vec<IntegrationPeriod>,
    pub bin_mlat: Vec<f64>,
    pub bin_mlon: Vec<f64>,
    /// Drift in covariant apex components (Ve1, Ve2, Ve3), m/s.
    pub velocity: Array3<f64>,
    pub velocity_covariance: Array4<f64>,
    /// Electric field in apex components (Ed1, Ed2, Ed3), V/m.
    pub electric_field: Array3<f64>,
    pub electric_field_covariance: Array4<f64>,
    pub be3: Array1<f64>,
    pub outcomes: Array2<CellOutcome>,
    pub geodetic: GeodeticOutput,
    pub metrics: Metrics,
}

/// Chains the processing stages over one measurement set.
pub struct Resolver<M: ApexModel> {
    config: ResolveConfig,
    logger: LogManager,
    model: PhantomData<M>,
}

impl<M: ApexModel> Resolver<M> {
    /// Fails on an invalid configuration before any data is touched.
    pub fn new(config: ResolveConfig) -> StageResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            logger: LogManager::default(),
            model: PhantomData,
        })
    }

    pub fn config(&self) -> &ResolveConfig {
        &self.config
    }

    pub fn run(&self, data: &MeasurementSet) -> StageResult<ResolvedVectors> {
        data.validate()?;
        let upb = self
            .config
            .upb_beam_code
            .map(|code| data.beam_profile(code))
            .transpose()?;
        let epoch = data.epoch_year()?;
        let model = M::at_epoch(epoch)?;
        self.logger.record(&format!(
            "resolving {} records x {} gates at epoch {:.4}",
            data.num_records(),
            data.num_gates(),
            epoch
        ));

        let filtered = FilterStage::new(&self.config).execute(data)?;
        let apex = TransformStage::new().execute(&data.geometry, &model)?;
        let corrected =
            OutflowStage::new().execute(&filtered, &data.geometry.alt, &apex, upb.as_ref())?;
        let bins = BinningStage::new(&self.config.bin_edges).execute(&apex)?;
        let periods = IntegrationStage::new(self.config.integration_time).execute(&data.time)?;

        let velocity =
            VelocityStage::new(&self.config).execute(&corrected, &apex, &bins, &periods)?;
        let field = ElectricFieldStage::new(self.config.output_altitude)
            .execute(&velocity, &bins, &model)?;
        let geodetic = GeodeticStage::new(self.config.output_altitude)
            .execute(&velocity, &field, &bins, &model)?;

        let recorder = MetricsRecorder::new();
        for outcome in velocity.outcomes.iter() {
            recorder.record_outcome(*outcome);
        }
        let metrics = recorder.snapshot();
        self.logger.record(&format!(
            "{} cells: {} resolved, {} under-determined, {} singular",
            metrics.total(),
            metrics.resolved,
            metrics.under_determined,
            metrics.singular
        ));

        Ok(ResolvedVectors {
            epoch,
            int_period: periods,
            bin_mlat: bins.iter().map(|b| b.mlat).collect(),
            bin_mlon: bins.iter().map(|b| b.mlon).collect(),
            velocity: velocity.velocity,
            velocity_covariance: velocity.covariance,
            electric_field: field.field,
            electric_field_covariance: field.covariance,
            be3: field.be3,
            outcomes: velocity.outcomes,
            geodetic,
            metrics,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apex::DipoleApex;
    use crate::measurement::{GateGeometry, TimeRecord};
    use crate::prelude::StageError;

    fn vertical_set() -> MeasurementSet {
        MeasurementSet {
            time: vec![TimeRecord::new(1_559_001_600.0, 1_559_001_660.0)],
            geometry: GateGeometry {
                beam_code: vec![64157],
                alt: vec![250e3],
                lat: vec![65.13],
                lon: vec![-147.47],
                ke: vec![0.0],
                kn: vec![0.0],
                kz: vec![1.0],
            },
            vlos: Array2::from_elem((1, 1), 20.0),
            dvlos: Array2::from_elem((1, 1), 10.0),
            ne: Array2::from_elem((1, 1), 1e11),
        }
    }

    #[test]
    fn invalid_config_is_rejected_up_front() {
        let config = ResolveConfig {
            min_num_points: 0,
            ..Default::default()
        };
        assert!(matches!(
            Resolver::<DipoleApex>::new(config),
            Err(StageError::InvalidConfig(_))
        ));
    }

    #[test]
    fn single_beam_cells_stay_dense_and_missing() {
        let resolver = Resolver::<DipoleApex>::new(ResolveConfig::default()).unwrap();
        let out = resolver.run(&vertical_set()).unwrap();
        let bins = resolver.config().bin_edges.len() - 1;
        assert_eq!(out.velocity.dim(), (1, bins, 3));
        assert_eq!(out.geodetic.velocity_covariance.dim(), (1, bins, 3, 3));
        assert_eq!(out.metrics.total(), bins);
        assert_eq!(out.metrics.resolved, 0);
        assert!(out.velocity.iter().all(|v| v.is_nan()));
        assert!((out.epoch - 2019.4).abs() < 0.01);
    }

    #[test]
    fn missing_upb_beam_is_fatal() {
        let config = ResolveConfig {
            upb_beam_code: Some(1),
            ..Default::default()
        };
        let resolver = Resolver::<DipoleApex>::new(config).unwrap();
        assert!(matches!(
            resolver.run(&vertical_set()),
            Err(StageError::UnknownBeam(1))
        ));
    }

    #[test]
    fn epoch_outside_model_range_is_fatal() {
        let mut data = vertical_set();
        data.time = vec![TimeRecord::new(0.0, 60.0)];
        let resolver = Resolver::<DipoleApex>::new(ResolveConfig::default()).unwrap();
        assert!(matches!(resolver.run(&data), Err(StageError::ApexModel(_))));
    }
}
