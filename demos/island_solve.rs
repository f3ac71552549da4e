use kinetree::*;

fn main() {
    let mut builder = ModelBuilder::new();
    for i in 0..32 {
        let x = i as f64;
        builder.add_body(
            BodySpec::new(&format!("wheel{i}"), ModelBuilder::WORLD)
                .with_pos(DVec3::new(x, 0.0, 0.0))
                .with_joint(JointSpec::hinge(DVec3::Z).with_damping(0.1)),
        );
        builder.add_body(
            BodySpec::new(&format!("gear{i}"), ModelBuilder::WORLD)
                .with_pos(DVec3::new(x, 1.0, 0.0))
                .with_joint(JointSpec::hinge(DVec3::Z)),
        );
        let pendulum = builder.add_body(
            BodySpec::new(&format!("pendulum{i}"), ModelBuilder::WORLD)
                .with_pos(DVec3::new(x, 2.0, 1.0))
                .with_com(DVec3::new(0.0, 0.0, -0.4))
                .with_joint(JointSpec::ball()),
        );
        // joints are numbered in body order: wheel, gear, pendulum
        builder.add_equality(Equality::joint(3 * i + 1, Some(3 * i), 0.5, 0.0));
        builder.add_equality(Equality::connect(
            pendulum,
            ModelBuilder::WORLD,
            DVec3::new(0.0, 0.0, -0.8),
            DVec3::new(x + 0.2, 2.0, 0.25),
        ));
    }

    let mut world = World::from_builder(&builder).expect("valid scene");
    world.set_parallel_enabled(true);
    for (i, f) in world.data_mut().qfrc_applied.iter_mut().enumerate() {
        *f = if i % 5 == 0 { 1.0 } else { 0.0 };
    }

    let steps = world.step(0.5);
    let data = world.data();
    println!(
        "{steps} steps, {} dofs, {} constraint rows in {} islands",
        world.model().nv,
        data.nefc,
        data.nisland
    );
    for i in 0..data.nisland.min(4) {
        println!("island {i}: dofs {:?}, rows {:?}", data.island_dofs(i), data.island_rows(i));
    }
    world.report_profile();
}
