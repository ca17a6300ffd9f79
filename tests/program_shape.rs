// tests/program_shape.rs
use glam::{DAffine3, DVec3};
use krl_motion::{
    AttributeStream, AttributeValue, CompilerConfig, Instruction, JointPose, KrlError,
    MotionCompiler, MoveKind, MoveTarget, PathSource, PathTransform, Program, Toolpath, Waypoint,
};

fn home() -> MoveTarget {
    MoveTarget::Joint(JointPose::new([5.0, -90.0, 100.0, 5.0, -10.0, -5.0]))
}

fn setup() -> MotionCompiler {
    MotionCompiler::new(CompilerConfig {
        program_name: "example".to_string(),
        base_number: 1,
        tool_number: 1,
        home_pose: home(),
        ..Default::default()
    })
}

fn sample_path() -> Toolpath {
    Toolpath::new(vec![
        Waypoint::new(281.36, 304.25, 459.51),
        Waypoint::new(245.07, 300.67, 459.51),
        Waypoint::new(210.17, 290.08, 459.51),
        Waypoint::new(178.02, 272.90, 459.51),
        Waypoint::new(149.83, 249.76, 459.51),
    ])
}

fn count_kind(program: &Program, kind: MoveKind) -> usize {
    program
        .instructions()
        .iter()
        .filter(|i| i.move_kind() == Some(kind))
        .count()
}

fn assignments(program: &Program) -> Vec<&Instruction> {
    program
        .instructions()
        .iter()
        .filter(|i| matches!(i, Instruction::Assign { .. }))
        .collect()
}

#[test]
fn test_five_waypoints_without_attributes() {
    let program = setup().compile(&sample_path()).unwrap();
    let instructions = program.instructions();

    // Home, first point, four LIN moves, home.
    assert_eq!(instructions.len(), 7);
    assert_eq!(instructions[0], Instruction::Ptp(home()));
    assert!(matches!(
        instructions[1],
        Instruction::Ptp(MoveTarget::Cartesian(_))
    ));
    assert!(
        instructions[2..6]
            .iter()
            .all(|i| i.move_kind() == Some(MoveKind::Continuous))
    );
    assert_eq!(instructions[6], Instruction::Ptp(home()));
    assert!(assignments(&program).is_empty());

    let text = program.text();
    assert!(text.ends_with(
        "LIN {X 149.8300, Y 249.7600, Z 459.5100, A 0.0000, B 90.0000, C 0.0000} C_DIS\n\
         PTP {A1 5.0000, A2 -90.0000, A3 100.0000, A4 5.0000, A5 -10.0000, A6 -5.0000}\n\
         END\n"
    ));
    assert_eq!(text.matches("\nEND\n").count(), 1);
    assert!(text.contains(
        ";ENDFOLD (INI)\n\n;FOLD STARTPOSITION - BASE IS 1, TOOL IS 1, SPEED IS 15%"
    ));
    assert!(text.contains(
        "$ADVANCE=3\n;ENDFOLD\n\
         PTP {A1 5.0000, A2 -90.0000, A3 100.0000, A4 5.0000, A5 -10.0000, A6 -5.0000}\n\
         PTP {X 281.3600, Y 304.2500, Z 459.5100, A 0.0000, B 90.0000, C 0.0000}\n"
    ));
}

#[test]
fn test_move_counts_for_any_length() {
    let compiler = setup();
    // N = 1 still moves to its single waypoint by PTP, so every program has three.
    for n in 1..8 {
        let toolpath = Toolpath::new(
            (0..n)
                .map(|i| Waypoint::new(i as f64, 2.0 * i as f64, 10.0))
                .collect(),
        );
        let program = compiler.compile(&toolpath).unwrap();
        let instructions = program.instructions();

        assert_eq!(count_kind(&program, MoveKind::PointToPoint), 3, "n = {n}");
        assert_eq!(count_kind(&program, MoveKind::Continuous), n - 1, "n = {n}");
        assert_eq!(instructions.first(), Some(&Instruction::Ptp(home())));
        assert_eq!(instructions.last(), Some(&Instruction::Ptp(home())));
    }
}

#[test]
fn test_empty_path_is_an_input_error() {
    let result = setup().compile(&Toolpath::default());
    assert!(matches!(result, Err(KrlError::Input(_))));
}

#[test]
fn test_compilation_is_deterministic() {
    let toolpath = sample_path()
        .with_variable("E_SPEED", AttributeStream::from_values([1.0, 1.0, 2.0, 2.0, 3.0]))
        .with_variable("F_SPEED", AttributeStream::from_values([50, 50, 100, 100, 0]))
        .with_variable("E_ENABLE", AttributeStream::from_values([true, true, false, true, true]))
        .with_path_speed(AttributeStream::from_values([0.05, 0.1, 0.1, 0.03, 0.08]));
    let a = setup().compile(&toolpath).unwrap();
    let b = setup().compile(&toolpath).unwrap();
    assert_eq!(a.text(), b.text());
}

#[test]
fn test_enable_stream_emits_once() {
    // Index 0 belongs to the first waypoint, which is reached by PTP.
    let toolpath = Toolpath::new(vec![
        Waypoint::new(0.0, 0.0, 0.0),
        Waypoint::new(10.0, 0.0, 0.0),
        Waypoint::new(20.0, 0.0, 0.0),
    ])
    .with_variable("E_ENABLE", AttributeStream::from_values([false, true, true]));

    let program = setup().compile(&toolpath).unwrap();
    let instructions = program.instructions();

    assert_eq!(assignments(&program).len(), 1);
    let at = instructions
        .iter()
        .position(|i| matches!(i, Instruction::Assign { .. }))
        .unwrap();
    assert_eq!(instructions[at].to_string(), "E_ENABLE = TRUE\n");
    assert_eq!(instructions[at + 1], Instruction::Wait(0.001));
    assert_eq!(instructions[at + 2].move_kind(), Some(MoveKind::Continuous));
    assert_eq!(
        instructions[at - 1].move_kind(),
        Some(MoveKind::PointToPoint)
    );
}

#[test]
fn test_repeated_values_are_debounced() {
    let toolpath = sample_path()
        .with_variable("E_SPEED", AttributeStream::from_values([9.0, 1.5, 1.5, 1.5, 2.5]))
        .with_variable(
            "F_SPEED",
            AttributeStream::from_options([None, Some(80), None, Some(80), None]),
        );
    let program = setup().compile(&toolpath).unwrap();
    let lines: Vec<String> = assignments(&program).iter().map(|i| i.to_string()).collect();

    assert_eq!(
        lines,
        [
            "E_SPEED = 1.500000\n",
            "F_SPEED = 80.000000\n",
            "E_SPEED = 2.500000\n",
        ]
    );
}

#[test]
fn test_whole_numbers_and_decimals_are_the_same_value() {
    let toolpath = Toolpath::from_json(
        r#"{
            "waypoints": [
                { "position": [0.0, 0.0, 0.0] },
                { "position": [1.0, 0.0, 0.0] },
                { "position": [2.0, 0.0, 0.0] }
            ],
            "variables": { "F_SPEED": [null, 100, 100.0] }
        }"#,
    )
    .unwrap();
    let program = setup().compile(&toolpath).unwrap();
    let lines: Vec<String> = assignments(&program).iter().map(|i| i.to_string()).collect();
    assert_eq!(lines, ["F_SPEED = 100.000000\n"]);

    let toolpath = sample_path().with_variable(
        "E_SPEED",
        AttributeStream::from_options([
            None,
            Some(AttributeValue::Int(2)),
            Some(AttributeValue::Float(2.0)),
        ]),
    );
    let program = setup().compile(&toolpath).unwrap();
    assert_eq!(assignments(&program).len(), 1);
}

#[test]
fn test_changes_precede_their_move() {
    let toolpath = Toolpath::new(vec![
        Waypoint::new(0.0, 0.0, 0.0),
        Waypoint::new(1.0, 0.0, 0.0),
        Waypoint::new(2.0, 0.0, 0.0),
    ])
    .with_variable("E_ENABLE", AttributeStream::sparse([(2, true)]))
    .with_variable("E_SPEED", AttributeStream::sparse([(2, 4.0)]))
    .with_path_speed(AttributeStream::sparse([(1, 0.05), (2, 0.2)]));

    let program = setup().compile(&toolpath).unwrap();
    let tail: Vec<String> = program.instructions()[3..]
        .iter()
        .map(|i| i.to_string())
        .collect();

    // 0.05 is the declared initial speed and is not repeated.
    assert_eq!(
        program.instructions()[2].to_string(),
        "LIN {X 1.0000, Y 0.0000, Z 0.0000, A 0.0000, B 90.0000, C 0.0000} C_DIS\n"
    );
    assert_eq!(
        tail,
        [
            "E_SPEED = 4.000000\n",
            "WAIT SEC 0.001\n",
            "E_ENABLE = TRUE\n",
            "WAIT SEC 0.001\n",
            "$VEL.CP=0.2000\n",
            "LIN {X 2.0000, Y 0.0000, Z 0.0000, A 0.0000, B 90.0000, C 0.0000} C_DIS\n",
            "PTP {A1 5.0000, A2 -90.0000, A3 100.0000, A4 5.0000, A5 -10.0000, A6 -5.0000}\n",
        ]
    );
}

#[test]
fn test_meters_to_millimeters() {
    let compiler = setup().with_transform(PathTransform::meters_to_millimeters(DAffine3::IDENTITY));
    let toolpath = Toolpath::new(vec![
        Waypoint::new(0.0, 0.0, 0.0),
        Waypoint::new(0.25, -0.5, 1.125).with_orientation(10.0, 20.0, 30.0),
    ]);
    let program = compiler.compile(&toolpath).unwrap();

    match &program.instructions()[1] {
        Instruction::Ptp(MoveTarget::Cartesian(pose)) => assert_eq!(pose.position, DVec3::ZERO),
        other => panic!("expected cartesian PTP, got {other:?}"),
    }
    match &program.instructions()[2] {
        Instruction::Lin(pose) => {
            assert_eq!(pose.position, DVec3::new(250.0, -500.0, 1125.0));
            assert_eq!(pose.orientation, DVec3::new(10.0, 20.0, 30.0));
        }
        other => panic!("expected LIN, got {other:?}"),
    }
}

#[test]
fn test_process_output_brackets_the_path() {
    let compiler = MotionCompiler::new(CompilerConfig {
        process_output: Some(5),
        ..Default::default()
    });
    let program = compiler.compile(&sample_path()).unwrap();
    let lines: Vec<String> = program
        .instructions()
        .iter()
        .map(|i| i.to_string())
        .collect();

    assert_eq!(lines[1], "$OUT[5] = TRUE\n");
    assert!(lines[2].starts_with("PTP {X 281.3600"));
    assert_eq!(lines[lines.len() - 2], "$OUT[5] = FALSE\n");
    assert!(lines[lines.len() - 1].starts_with("PTP {A1"));
}

struct FailingScene;

impl PathSource for FailingScene {
    fn load_toolpath(&self) -> anyhow::Result<Toolpath> {
        anyhow::bail!("no position attribute on selected object")
    }
}

#[test]
fn test_source_failure_produces_no_program() {
    let result = setup().compile_from(&FailingScene);
    match result {
        Err(KrlError::Collaborator(e)) => assert!(e.to_string().contains("position attribute")),
        other => panic!("expected collaborator error, got {other:?}"),
    }

    let program = setup().compile_from(&sample_path()).unwrap();
    assert_eq!(program.name(), "example");
}
