//! Manifest front-end tests: YAML in, realized outputs out.

use pretty_assertions::assert_eq;

use stackplan::prelude::*;

const WEB_MANIFEST: &str = r#"
name: web-stack
network:
  name: custom
  cidr: 10.0.0.0/16
  zones: 2
  subnets: [public, private]
  nat_gateways: 1
access_sets:
  - name: web-access-sg
    ingress:
      - { name: https-access, locator: anywhere, ports: 80, description: allow HTTP access from anywhere }
      - { name: ssh-access, locator: anywhere, ports: 22, description: allow SSH access from anywhere }
    egress:
      - { name: outbound-access, locator: anywhere, ports: all, description: allow outbound access to anywhere }
instances:
  - name: webserver-www-1
    size: t2.micro
    image: { name_pattern: "amzn-ami-hvm-*", owner: "137112412989" }
    subnet: { kind: public, zone: 0 }
    access_sets: [web-access-sg]
  - name: webserver-www-2
    size: t2.micro
    image: { name_pattern: "amzn-ami-hvm-*", owner: "137112412989" }
    subnet: { kind: public, zone: 1 }
    access_sets: [web-access-sg]
balancer:
  name: web-traffic
  access_set: web-access-sg
  listeners:
    - port: 80
      targets: [webserver-www-1, webserver-www-2]
outputs:
  endpoint: { entity: web-traffic, attribute: hostname }
  vpc_id: { entity: custom, attribute: id }
  subnet1_id: { entity: custom-public-0, attribute: id }
  subnet2_id: { entity: custom-public-1, attribute: id }
"#;

#[tokio::test]
async fn test_manifest_realizes_end_to_end() {
    let stack = StackManifest::from_yaml(WEB_MANIFEST).unwrap().lower().unwrap();
    assert_eq!(stack.name(), "web-stack");

    let provider = SimulatedProvider::amazon_linux();
    let realized = Realizer::new(&provider).realize(&stack).await.unwrap();

    assert!(!realized.output_str("endpoint").unwrap().is_empty());
    assert!(realized.output_str("vpc_id").unwrap().starts_with("vpc-"));
    assert!(realized.output_str("subnet1_id").unwrap().starts_with("subnet-"));
    assert_eq!(realized.outputs().len(), 4);
    assert_eq!(provider.registered_targets().len(), 2);
}

#[test]
fn test_manifest_graph_is_acyclic_and_rooted_at_network() {
    let stack = StackManifest::from_yaml(WEB_MANIFEST).unwrap().lower().unwrap();
    let order = stack.realization_order().unwrap();

    assert_eq!(order.first().map(String::as_str), Some("custom"));
    let balancer_pos = order.iter().position(|id| id == "web-traffic").unwrap();
    for instance in ["webserver-www-1", "webserver-www-2"] {
        let pos = order.iter().position(|id| id == instance).unwrap();
        assert!(pos < balancer_pos, "{instance} must realize before the balancer");
    }
}

#[test]
fn test_manifest_dot_export_names_entities() {
    let stack = StackManifest::from_yaml(WEB_MANIFEST).unwrap().lower().unwrap();
    let dot = stack.to_dot();
    assert!(dot.contains("web-traffic"));
    assert!(dot.contains("custom-public-0"));
}
