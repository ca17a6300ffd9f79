//! The KRL program model.
//!
//! A program is built as two ordered segments, [`Declaration`]s and motion
//! [`Instruction`]s, held by a [`ProgramBuilder`]. Nothing is rendered to text until
//! [`ProgramBuilder::finalize`], which produces the immutable [`Program`].
//!
//! The builder does no cross-segment validation. Value checks that would make a
//! line unparseable by the controller happen when an instruction is constructed
//! (see [`Instruction::assign`], [`JointPose::from_slice`]).

use crate::error::{KrlError, KrlResult};
use crate::path::AttributeValue;
use crate::state::MoveKind;
use glam::DVec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Write;
use std::path::Path;

/// Line that closes every program.
pub const END_MARKER: &str = "END";

/// Orientation used for Cartesian targets that do not carry one (A, B, C degrees).
pub const DEFAULT_ORIENTATION: DVec3 = DVec3::new(0.0, 90.0, 0.0);

/// Approximation distance written into the start-position fold.
const APPROXIMATION_DISTANCE: u32 = 50;

/// A joint-space pose in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct JointPose {
    /// Robot axes A1..A6.
    pub axes: [f64; 6],

    /// External axes E1..E4, if the cell has any.
    #[serde(default)]
    pub external: Option<[f64; 4]>,
}

impl JointPose {
    pub const fn new(axes: [f64; 6]) -> Self {
        Self {
            axes,
            external: None,
        }
    }

    pub const fn with_external(mut self, external: [f64; 4]) -> Self {
        self.external = Some(external);
        self
    }

    /// Builds a pose from 6 (A1..A6) or 10 (A1..A6, E1..E4) values.
    pub fn from_slice(values: &[f64]) -> KrlResult<Self> {
        if values.len() != 6 && values.len() != 10 {
            return Err(KrlError::input(format!(
                "joint pose needs 6 or 10 values, got {}",
                values.len()
            )));
        }
        ensure_finite("joint pose", values)?;

        let mut axes = [0.0; 6];
        axes.copy_from_slice(&values[..6]);
        let external = match values.get(6..) {
            Some(rest) if rest.len() == 4 => {
                let mut external = [0.0; 4];
                external.copy_from_slice(rest);
                Some(external)
            }
            _ => None,
        };
        Ok(Self { axes, external })
    }

    fn is_finite(&self) -> bool {
        self.axes.iter().chain(self.external.iter().flatten()).all(|v| v.is_finite())
    }
}

/// A Cartesian pose: position in millimeters, orientation as A, B, C in degrees.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CartesianPose {
    pub position: DVec3,
    pub orientation: DVec3,
}

impl CartesianPose {
    pub const fn new(position: DVec3, orientation: DVec3) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Builds a pose from `X, Y, Z` or `X, Y, Z, A, B, C`.
    ///
    /// With fewer than six values the orientation is [`DEFAULT_ORIENTATION`].
    pub fn from_slice(values: &[f64]) -> KrlResult<Self> {
        if values.len() < 3 {
            return Err(KrlError::input(format!(
                "cartesian pose needs at least X, Y, Z, got {} values",
                values.len()
            )));
        }
        ensure_finite("cartesian pose", values)?;

        let position = DVec3::new(values[0], values[1], values[2]);
        let orientation = match values.get(3..6) {
            Some(abc) => DVec3::new(abc[0], abc[1], abc[2]),
            None => DEFAULT_ORIENTATION,
        };
        Ok(Self::new(position, orientation))
    }

    fn is_finite(&self) -> bool {
        self.position.is_finite() && self.orientation.is_finite()
    }
}

/// Target of a point-to-point move.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MoveTarget {
    Joint(JointPose),
    Cartesian(CartesianPose),
}

impl MoveTarget {
    pub fn is_finite(&self) -> bool {
        match self {
            Self::Joint(pose) => pose.is_finite(),
            Self::Cartesian(pose) => pose.is_finite(),
        }
    }

    /// Motion fields at four decimal places, e.g. `A1 5.0000, ..., A6 -5.0000`.
    fn fields(&self) -> String {
        match self {
            Self::Joint(pose) => {
                let mut fields: Vec<String> = pose
                    .axes
                    .iter()
                    .enumerate()
                    .map(|(i, v)| format!("A{} {v:.4}", i + 1))
                    .collect();
                if let Some(external) = pose.external {
                    fields.extend(
                        external
                            .iter()
                            .enumerate()
                            .map(|(i, v)| format!("E{} {v:.4}", i + 1)),
                    );
                }
                fields.join(", ")
            }
            Self::Cartesian(pose) => cartesian_fields(pose),
        }
    }

    /// Human-readable position for fold titles. External axes are always listed.
    fn description(&self) -> String {
        match self {
            Self::Joint(pose) => {
                let external = pose.external.unwrap_or([0.0; 4]);
                let axes = pose.axes.iter().enumerate().map(|(i, v)| format!("A{} {v}", i + 1));
                let external = external.iter().enumerate().map(|(i, v)| format!("E{} {v}", i + 1));
                axes.chain(external).collect::<Vec<_>>().join(", ")
            }
            Self::Cartesian(pose) => {
                let p = pose.position;
                let o = pose.orientation;
                format!(
                    "X {}, Y {}, Z {}, A {}, B {}, C {}",
                    p.x, p.y, p.z, o.x, o.y, o.z
                )
            }
        }
    }
}

impl From<JointPose> for MoveTarget {
    fn from(pose: JointPose) -> Self {
        Self::Joint(pose)
    }
}

impl From<CartesianPose> for MoveTarget {
    fn from(pose: CartesianPose) -> Self {
        Self::Cartesian(pose)
    }
}

fn cartesian_fields(pose: &CartesianPose) -> String {
    let p = pose.position;
    let o = pose.orientation;
    format!(
        "X {:.4}, Y {:.4}, Z {:.4}, A {:.4}, B {:.4}, C {:.4}",
        p.x, p.y, p.z, o.x, o.y, o.z
    )
}

fn ensure_finite(what: &str, values: &[f64]) -> KrlResult<()> {
    match values.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(KrlError::input(format!(
            "{what} value {i} is not finite: {}",
            values[i]
        ))),
        None => Ok(()),
    }
}

/// Tool load data (`DECL TOOLDATA`).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolData {
    pub number: u32,
    /// Mass in kg.
    pub mass: f64,
    /// Center of mass in the flange frame, millimeters.
    pub center_of_mass: DVec3,
}

impl Default for ToolData {
    fn default() -> Self {
        Self {
            number: 1,
            mass: 0.5,
            center_of_mass: DVec3::ZERO,
        }
    }
}

/// Base frame (`DECL FRAME`).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BaseFrame {
    pub number: u32,
    pub position: DVec3,
    pub orientation: DVec3,
}

impl Default for BaseFrame {
    fn default() -> Self {
        Self {
            number: 1,
            position: DVec3::ZERO,
            orientation: DVec3::ZERO,
        }
    }
}

/// Contents of the start-position and LIN-speed folds.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct StartParameters {
    pub base: u32,
    pub tool: u32,
    /// PTP velocity override in percent.
    pub speed_percent: f64,
    pub acceleration: f64,
    /// Initial `$VEL.CP` in m/s.
    pub path_speed: f64,
    /// Initial `$ADVANCE`.
    pub look_ahead: u32,
    pub home: MoveTarget,
}

/// An entry of the declaration segment.
#[derive(Clone, Debug, PartialEq)]
pub enum Declaration {
    /// Access mode, template reference, `DEF` line and the INI fold.
    Header { name: String },
    Tool(ToolData),
    Base(BaseFrame),
    Speed { velocity: f64, acceleration: f64 },
    StartParameters(StartParameters),
    /// Verbatim text.
    Raw(String),
}

impl From<String> for Declaration {
    fn from(text: String) -> Self {
        Self::Raw(text)
    }
}

impl From<&str> for Declaration {
    fn from(text: &str) -> Self {
        Self::Raw(text.to_string())
    }
}

impl fmt::Display for Declaration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header { name } => {
                writeln!(f, "&ACCESS RVP")?;
                writeln!(f, "&REL 1")?;
                writeln!(f, "&PARAM TEMPLATE = C:\\KRC\\Roboter\\Template\\vorgabe")?;
                writeln!(f, "&PARAM EDITMASK = *")?;
                writeln!(f, "DEF {name}()")?;
                writeln!(f)?;
                writeln!(f, ";FOLD INI")?;
                writeln!(f, ";FOLD BASISTECH INI")?;
                writeln!(
                    f,
                    "GLOBAL INTERRUPT DECL 3 WHEN $STOPMESS==TRUE DO IR_STOPM()"
                )?;
                writeln!(f, "INTERRUPT ON 3")?;
                writeln!(f, "BAS(#INITMOV, 0)")?;
                writeln!(f, ";ENDFOLD (BASISTECH INI)")?;
                writeln!(f, ";ENDFOLD (INI)")?;
                writeln!(f)
            }
            Self::Tool(tool) => {
                let cm = tool.center_of_mass;
                writeln!(
                    f,
                    "DECL TOOLDATA TOOL_{} = {{M {}, CM {{X {}, Y {}, Z {}}}}}",
                    tool.number, tool.mass, cm.x, cm.y, cm.z
                )
            }
            Self::Base(base) => {
                let p = base.position;
                let o = base.orientation;
                writeln!(
                    f,
                    "DECL FRAME BASE_{} = {{X {}, Y {}, Z {}, A {}, B {}, C {}}}",
                    base.number, p.x, p.y, p.z, o.x, o.y, o.z
                )
            }
            Self::Speed {
                velocity,
                acceleration,
            } => {
                writeln!(f, "DECL REAL VEL = {velocity}")?;
                writeln!(f, "DECL REAL ACC = {acceleration}")
            }
            Self::StartParameters(p) => {
                writeln!(
                    f,
                    ";FOLD STARTPOSITION - BASE IS {}, TOOL IS {}, SPEED IS {}%, POSITION IS {}",
                    p.base,
                    p.tool,
                    p.speed_percent,
                    p.home.description()
                )?;
                writeln!(f, "$BWDSTART = FALSE")?;
                writeln!(
                    f,
                    "PDAT_ACT = {{VEL {}, ACC {}, APO_DIST {APPROXIMATION_DISTANCE}}}",
                    p.speed_percent, p.acceleration
                )?;
                writeln!(
                    f,
                    "FDAT_ACT = {{TOOL_NO {}, BASE_NO {}, IPO_FRAME #BASE}}",
                    p.tool, p.base
                )?;
                writeln!(f, "BAS(#PTP_PARAMS, {})", p.speed_percent)?;
                writeln!(f, ";ENDFOLD")?;
                writeln!(f)?;
                writeln!(
                    f,
                    ";FOLD LIN SPEED IS {} m/sec, INTERPOLATION SETTINGS IN FOLD",
                    p.path_speed
                )?;
                writeln!(f, "$VEL.CP={:.4}", p.path_speed)?;
                writeln!(f, "$ADVANCE={}", p.look_ahead)?;
                writeln!(f, ";ENDFOLD")
            }
            Self::Raw(text) => f.write_str(text),
        }
    }
}

/// A single line of the motion segment.
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction {
    /// Joint-interpolated move (`PTP`).
    Ptp(MoveTarget),
    /// Cartesian straight-line move with approximation (`LIN ... C_DIS`).
    Lin(CartesianPose),
    /// TCP path speed in m/s (`$VEL.CP`).
    SetPathSpeed(f64),
    /// Motion look-ahead (`$ADVANCE`).
    SetAdvance(u32),
    /// Assignment to a named controller variable. Build with [`Instruction::assign`].
    Assign {
        name: String,
        value: AttributeValue,
    },
    SetDigitalOutput {
        output: u32,
        value: bool,
    },
    SetAnalogOutput {
        output: u32,
        value: f64,
    },
    WaitForInput {
        input: u32,
        value: bool,
    },
    /// Dwell in seconds (`WAIT SEC`).
    Wait(f64),
    Comment(String),
    /// Message on the teach pendant.
    Print(String),
    /// Verbatim text.
    Raw(String),
}

impl Instruction {
    /// A variable assignment, rejecting values KRL cannot represent.
    pub fn assign(name: impl Into<String>, value: AttributeValue) -> KrlResult<Self> {
        value.to_krl()?;
        Ok(Self::Assign {
            name: name.into(),
            value,
        })
    }

    pub fn move_kind(&self) -> Option<MoveKind> {
        match self {
            Self::Ptp(_) => Some(MoveKind::PointToPoint),
            Self::Lin(_) => Some(MoveKind::Continuous),
            _ => None,
        }
    }
}

impl From<String> for Instruction {
    fn from(text: String) -> Self {
        Self::Raw(text)
    }
}

impl From<&str> for Instruction {
    fn from(text: &str) -> Self {
        Self::Raw(text.to_string())
    }
}

fn krl_bool(value: bool) -> &'static str {
    if value { "TRUE" } else { "FALSE" }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ptp(target) => writeln!(f, "PTP {{{}}}", target.fields()),
            Self::Lin(pose) => writeln!(f, "LIN {{{}}} C_DIS", cartesian_fields(pose)),
            Self::SetPathSpeed(speed) => writeln!(f, "$VEL.CP={speed:.4}"),
            Self::SetAdvance(advance) => writeln!(f, "$ADVANCE={advance}"),
            Self::Assign { name, value } => writeln!(f, "{name} = {}", value.literal()),
            Self::SetDigitalOutput { output, value } => {
                writeln!(f, "$OUT[{output}] = {}", krl_bool(*value))
            }
            Self::SetAnalogOutput { output, value } => writeln!(f, "$ANOUT[{output}] = {value}"),
            Self::WaitForInput { input, value } => {
                writeln!(f, "WAIT FOR $IN[{input}] == {}", krl_bool(*value))
            }
            Self::Wait(seconds) => writeln!(f, "WAIT SEC {seconds}"),
            Self::Comment(msg) => writeln!(f, "; {msg}"),
            Self::Print(msg) => writeln!(f, "TPWrite \"{msg}\""),
            Self::Raw(text) => f.write_str(text),
        }
    }
}

/// Accumulates the declaration and motion segments of one program.
#[derive(Clone, Debug)]
pub struct ProgramBuilder {
    name: String,
    declarations: Vec<Declaration>,
    instructions: Vec<Instruction>,
}

impl ProgramBuilder {
    /// Starts a program named `name`; the header is the first declaration.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            declarations: vec![Declaration::Header { name: name.clone() }],
            instructions: Vec::new(),
            name,
        }
    }

    pub fn append_declaration(&mut self, declaration: impl Into<Declaration>) {
        self.declarations.push(declaration.into());
    }

    pub fn append_motion(&mut self, instruction: impl Into<Instruction>) {
        self.instructions.push(instruction.into());
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Renders both segments followed by the end marker.
    pub fn finalize(self) -> Program {
        let mut text = String::new();
        for declaration in &self.declarations {
            text.push_str(&declaration.to_string());
        }
        for instruction in &self.instructions {
            text.push_str(&instruction.to_string());
        }
        text.push_str(END_MARKER);
        text.push('\n');

        Program {
            name: self.name,
            declarations: self.declarations,
            instructions: self.instructions,
            text,
        }
    }
}

/// A finished program. Immutable.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    name: String,
    declarations: Vec<Declaration>,
    instructions: Vec<Instruction>,
    text: String,
}

impl Program {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn write_to<W: Write>(&self, mut writer: W) -> KrlResult<()> {
        writer.write_all(self.text.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    /// Writes the program to `path`, typically `<name>.src`.
    pub fn save(&self, path: impl AsRef<Path>) -> KrlResult<()> {
        let file = std::fs::File::create(path)?;
        self.write_to(std::io::BufWriter::new(file))
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}
