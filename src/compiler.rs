//! Compiler that turns a [`Toolpath`] into a KRL [`Program`].
//!
//! The entry point is [`MotionCompiler`]. Configure it with a [`CompilerConfig`] and a
//! [`PathTransform`], then call [`MotionCompiler::compile`] with a toolpath or
//! [`MotionCompiler::compile_from`] with any [`PathSource`].

use crate::error::{KrlError, KrlResult};
use crate::path::{AttributeStream, PathSource, PathTransform, Toolpath};
use crate::program::{
    BaseFrame, CartesianPose, DEFAULT_ORIENTATION, Declaration, Instruction, JointPose,
    MoveTarget, Program, ProgramBuilder, StartParameters, ToolData,
};
use crate::state::{CompilerState, MoveKind};
use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Default home pose, A1..A6 in degrees.
pub const DEFAULT_HOME: JointPose = JointPose::new([5.0, -90.0, 100.0, 5.0, -10.0, -5.0]);

/// Program-level settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Name used in the `DEF` line.
    pub program_name: String,
    pub base_number: u32,
    pub tool_number: u32,
    /// PTP velocity override in percent.
    pub speed_percent: f64,
    pub acceleration: f64,
    /// Initial TCP speed in m/s.
    pub path_speed: f64,
    /// `$ADVANCE` look-ahead.
    pub look_ahead_distance: u32,
    /// Pose visited before the first and after the last waypoint.
    pub home_pose: MoveTarget,
    /// A, B, C used for waypoints without an orientation.
    pub default_orientation: DVec3,
    /// Emission order of variables changing at the same waypoint.
    /// Variables not listed follow in name order.
    pub variable_priority: Vec<String>,
    /// Dwell written after every assignment, in seconds.
    pub assignment_settle_time: Option<f64>,
    /// Digital output held `TRUE` while the path runs.
    pub process_output: Option<u32>,
    pub tool_data: Option<ToolData>,
    pub base_frame: Option<BaseFrame>,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            program_name: "kuka_program".to_string(),
            base_number: 0,
            tool_number: 0,
            speed_percent: 15.0,
            acceleration: 100.0,
            path_speed: 0.05,
            look_ahead_distance: 3,
            home_pose: MoveTarget::Joint(DEFAULT_HOME),
            default_orientation: DEFAULT_ORIENTATION,
            variable_priority: vec![
                "E_SPEED".to_string(),
                "E_ENABLE".to_string(),
                "F_SPEED".to_string(),
            ],
            assignment_settle_time: Some(0.001),
            process_output: None,
            tool_data: None,
            base_frame: None,
        }
    }
}

impl CompilerConfig {
    /// Parses a configuration from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> KrlResult<Self> {
        serde_json::from_str(json).map_err(|e| KrlError::config(e.to_string()))
    }

    pub fn start_parameters(&self) -> StartParameters {
        StartParameters {
            base: self.base_number,
            tool: self.tool_number,
            speed_percent: self.speed_percent,
            acceleration: self.acceleration,
            path_speed: self.path_speed,
            look_ahead: self.look_ahead_distance,
            home: self.home_pose,
        }
    }

    fn validate(&self) -> KrlResult<()> {
        if !self.home_pose.is_finite() {
            return Err(KrlError::config("home pose is not finite"));
        }
        if !self.path_speed.is_finite() || self.path_speed <= 0.0 {
            return Err(KrlError::config(format!(
                "path speed must be positive, got {}",
                self.path_speed
            )));
        }
        if !self.default_orientation.is_finite() {
            return Err(KrlError::config("default orientation is not finite"));
        }
        if let Some(t) = self.assignment_settle_time
            && !(t.is_finite() && t >= 0.0)
        {
            return Err(KrlError::config(format!("invalid settle time {t}")));
        }
        Ok(())
    }
}

/// Compiles toolpaths into KRL programs.
#[derive(Clone, Debug, Default)]
pub struct MotionCompiler {
    config: CompilerConfig,
    transform: PathTransform,
}

impl MotionCompiler {
    /// Creates a compiler with an identity transform.
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            config,
            transform: PathTransform::IDENTITY,
        }
    }

    /// Sets the local-to-controller transform (builder pattern).
    pub fn with_transform(mut self, transform: PathTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn transform(&self) -> &PathTransform {
        &self.transform
    }

    /// Loads a toolpath from `source` and compiles it.
    ///
    /// A source failure is reported as [`KrlError::Collaborator`]; no program is produced.
    pub fn compile_from(&self, source: &dyn PathSource) -> KrlResult<Program> {
        let toolpath = source.load_toolpath()?;
        self.compile(&toolpath)
    }

    /// Compiles `toolpath` into a finished program.
    ///
    /// # Shape of the output
    ///
    /// 1. Header, optional tool/base declarations, start-position and LIN-speed folds.
    /// 2. `PTP` to the home pose.
    /// 3. `PTP` to the first waypoint. Attribute values at index 0 are not emitted.
    /// 4. For every later waypoint: changed variables in priority order (each followed
    ///    by the settle dwell), a `$VEL.CP` change if the speed changed, then `LIN`.
    /// 5. `PTP` back to the home pose, then `END`.
    ///
    /// A value equal to the last one emitted for the same variable is never written again.
    ///
    /// # Errors
    ///
    /// Fails without output on an empty or non-finite path, an invalid configuration,
    /// an attribute value KRL cannot represent, or a path speed that is not positive.
    #[tracing::instrument(skip_all, fields(program = %self.config.program_name))]
    pub fn compile(&self, toolpath: &Toolpath) -> KrlResult<Program> {
        self.config.validate()?;
        if toolpath.waypoints.is_empty() {
            return Err(KrlError::input("toolpath has no waypoints"));
        }

        // Transform everything up front so a bad point aborts before any output.
        let targets = self.transform_waypoints(toolpath)?;
        let variables = self.ordered_variables(toolpath);
        let cfg = &self.config;

        let mut builder = ProgramBuilder::new(cfg.program_name.as_str());
        if let Some(tool) = cfg.tool_data {
            builder.append_declaration(Declaration::Tool(tool));
        }
        if let Some(base) = cfg.base_frame {
            builder.append_declaration(Declaration::Base(base));
        }
        builder.append_declaration(Declaration::StartParameters(cfg.start_parameters()));

        let mut state = CompilerState::new(cfg.path_speed);

        state.enter(MoveKind::PointToPoint)?;
        builder.append_motion(Instruction::Ptp(cfg.home_pose));

        if let Some(output) = cfg.process_output {
            builder.append_motion(Instruction::SetDigitalOutput {
                output,
                value: true,
            });
        }

        let (first, rest) = targets
            .split_first()
            .ok_or_else(|| KrlError::input("toolpath has no waypoints"))?;
        state.enter(MoveKind::PointToPoint)?;
        builder.append_motion(Instruction::Ptp(MoveTarget::Cartesian(*first)));

        for (offset, target) in rest.iter().enumerate() {
            let index = offset + 1;

            for (name, stream) in &variables {
                let Some(value) = stream.get(index) else {
                    continue;
                };
                let instruction = Instruction::assign(*name, value)?;
                if state.observe_variable(name, value) {
                    tracing::debug!(index, variable = %name, ?value, "variable changed");
                    builder.append_motion(instruction);
                    if let Some(seconds) = cfg.assignment_settle_time {
                        builder.append_motion(Instruction::Wait(seconds));
                    }
                }
            }

            if let Some(stream) = &toolpath.path_speed
                && let Some(value) = stream.get(index)
            {
                let speed = value
                    .as_f64()
                    .filter(|s| s.is_finite() && *s > 0.0)
                    .ok_or_else(|| {
                        KrlError::unsupported_value(format!(
                            "path speed at waypoint {index} is {value:?}"
                        ))
                    })?;
                if state.observe_path_speed(speed) {
                    tracing::debug!(index, speed, "path speed changed");
                    builder.append_motion(Instruction::SetPathSpeed(speed));
                }
            }

            state.enter(MoveKind::Continuous)?;
            builder.append_motion(Instruction::Lin(*target));
        }

        if let Some(output) = cfg.process_output {
            builder.append_motion(Instruction::SetDigitalOutput {
                output,
                value: false,
            });
        }

        state.enter(MoveKind::PointToPoint)?;
        builder.append_motion(Instruction::Ptp(cfg.home_pose));

        let program = builder.finalize();
        tracing::info!(
            waypoints = targets.len(),
            instructions = program.instructions().len(),
            "program compiled"
        );
        Ok(program)
    }

    /// Applies the transform once per waypoint and fills in default orientations.
    fn transform_waypoints(&self, toolpath: &Toolpath) -> KrlResult<Vec<CartesianPose>> {
        toolpath
            .waypoints
            .iter()
            .enumerate()
            .map(|(index, waypoint)| {
                let position = self.transform.apply(waypoint.position);
                let orientation = waypoint
                    .orientation
                    .unwrap_or(self.config.default_orientation);
                if !position.is_finite() || !orientation.is_finite() {
                    return Err(KrlError::input(format!(
                        "waypoint {index} is not finite after transform: {position}"
                    )));
                }
                Ok(CartesianPose::new(position, orientation))
            })
            .collect()
    }

    /// Priority-listed variables first, then the rest by name.
    fn ordered_variables<'a>(&self, toolpath: &'a Toolpath) -> Vec<(&'a str, &'a AttributeStream)> {
        let mut ordered: Vec<(&str, &AttributeStream)> = Vec::new();
        for name in &self.config.variable_priority {
            if let Some((key, stream)) = toolpath.variables.get_key_value(name.as_str())
                && !ordered.iter().any(|(n, _)| *n == key.as_str())
            {
                ordered.push((key.as_str(), stream));
            }
        }
        for (name, stream) in &toolpath.variables {
            if !ordered.iter().any(|(n, _)| *n == name.as_str()) {
                ordered.push((name.as_str(), stream));
            }
        }
        ordered
    }
}
