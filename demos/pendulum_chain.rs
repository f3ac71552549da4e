use kinetree::*;

fn main() {
    let mut builder = ModelBuilder::new();
    let mut parent = ModelBuilder::WORLD;
    for i in 0..6 {
        let offset = if i == 0 { DVec3::new(0.0, 0.0, 2.0) } else { DVec3::new(0.3, 0.0, 0.0) };
        parent = builder.add_body(
            BodySpec::new(&format!("link{i}"), parent)
                .with_pos(offset)
                .with_com(DVec3::new(0.15, 0.0, 0.0))
                .with_mass(0.5, DVec3::splat(0.01))
                .with_joint(JointSpec::hinge(DVec3::Y).with_damping(0.02)),
        );
    }
    // close the loop: the last link's tip hangs from a second anchor
    builder.add_equality(Equality::connect(
        parent,
        ModelBuilder::WORLD,
        DVec3::new(0.3, 0.0, 0.0),
        DVec3::new(1.2, 0.0, 2.0),
    ));

    let mut engine = Engine::new(&builder).expect("valid chain");
    for _ in 0..1000 {
        engine.step(1.0 / 500.0);
    }

    let data = engine.world().data();
    println!("Simulated hanging chain for {:.2} s", data.time);
    println!("Joint angles: {:?}", engine.qpos());
    println!("Tip constraint error: {:?}", data.efc_pos);
}
