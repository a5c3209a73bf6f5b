//! Subnets, gateways and routing behind a created network.
//!
//! Every availability zone gets one public and one private /24 subnet carved
//! from the network block. Public subnets route through an internet gateway.
//! Private subnets share a single NAT gateway placed in the first public
//! subnet.

use serde_json::{json, Map, Value};

use crate::services::template::TemplateResource;

/// Host bits of every subnet carved from the network block.
pub const SUBNET_HOST_BITS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Public,
    Private,
}

impl Tier {
    pub const ALL: [Tier; 2] = [Self::Public, Self::Private];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "Public",
            Self::Private => "Private",
        }
    }
}

pub fn subnet_id(network: &str, tier: Tier, zone: u32) -> String {
    format!("{network}{}Subnet{zone}", tier.as_str())
}

pub fn route_table_id(network: &str, tier: Tier) -> String {
    format!("{network}{}RouteTable", tier.as_str())
}

/// Longest network prefix that still holds a public and a private subnet in
/// each of `zones` availability zones.
pub fn max_prefix_len(zones: u32) -> u32 {
    let subnets = 2 * zones.max(1);
    let index_bits = u32::BITS - (subnets - 1).leading_zeros();
    32 - SUBNET_HOST_BITS - index_bits
}

/// `Ref`s to the private subnets, in zone order.
pub fn private_subnet_refs(network: &str, zones: u32) -> Value {
    Value::Array(
        (1..=zones)
            .map(|zone| json!({ "Ref": subnet_id(network, Tier::Private, zone) }))
            .collect(),
    )
}

/// Route tables a gateway endpoint attaches to.
pub fn route_table_refs(network: &str) -> Value {
    Value::Array(
        Tier::ALL
            .iter()
            .map(|tier| json!({ "Ref": route_table_id(network, *tier) }))
            .collect(),
    )
}

/// Template resources for the subnets and routing of `network`.
pub fn resources(
    network: &str,
    cidr_block: &Value,
    zones: u32,
    tags: Option<&Value>,
) -> Vec<(String, TemplateResource)> {
    let vpc = json!({ "Ref": network });
    let internet_gateway = format!("{network}InternetGateway");
    let attachment = format!("{network}InternetGatewayAttachment");
    let nat_address = format!("{network}NatAddress");
    let nat_gateway = format!("{network}NatGateway");
    let blocks = json!({
        "Fn::Cidr": [cidr_block, zones * 2, SUBNET_HOST_BITS.to_string()]
    });

    let mut out = vec![
        (
            internet_gateway.clone(),
            resource("AWS::EC2::InternetGateway", json!({}), tags, &[]),
        ),
        (
            attachment.clone(),
            resource(
                "AWS::EC2::VPCGatewayAttachment",
                json!({ "VpcId": vpc, "InternetGatewayId": { "Ref": internet_gateway } }),
                None,
                &[],
            ),
        ),
        (
            nat_address.clone(),
            resource(
                "AWS::EC2::EIP",
                json!({ "Domain": "vpc" }),
                tags,
                &[attachment.as_str()],
            ),
        ),
        (
            nat_gateway.clone(),
            resource(
                "AWS::EC2::NatGateway",
                json!({
                    "AllocationId": { "Fn::GetAtt": [nat_address, "AllocationId"] },
                    "SubnetId": { "Ref": subnet_id(network, Tier::Public, 1) },
                }),
                tags,
                &[],
            ),
        ),
    ];

    for tier in Tier::ALL {
        let table = route_table_id(network, tier);
        out.push((
            table.clone(),
            resource("AWS::EC2::RouteTable", json!({ "VpcId": vpc }), tags, &[]),
        ));
        let (target_key, target, depends_on) = match tier {
            Tier::Public => ("GatewayId", &internet_gateway, vec![attachment.as_str()]),
            Tier::Private => ("NatGatewayId", &nat_gateway, Vec::new()),
        };
        let mut route = Map::new();
        route.insert("RouteTableId".into(), json!({ "Ref": table }));
        route.insert("DestinationCidrBlock".into(), json!("0.0.0.0/0"));
        route.insert(target_key.into(), json!({ "Ref": target }));
        out.push((
            format!("{network}{}DefaultRoute", tier.as_str()),
            resource("AWS::EC2::Route", Value::Object(route), None, &depends_on),
        ));

        for zone in 1..=zones {
            let index = zone - 1;
            let block = match tier {
                Tier::Public => index,
                Tier::Private => zones + index,
            };
            let subnet = subnet_id(network, tier, zone);
            out.push((
                subnet.clone(),
                resource(
                    "AWS::EC2::Subnet",
                    json!({
                        "VpcId": vpc,
                        "AvailabilityZone": { "Fn::Select": [index, { "Fn::GetAZs": "" }] },
                        "CidrBlock": { "Fn::Select": [block, blocks] },
                        "MapPublicIpOnLaunch": tier == Tier::Public,
                    }),
                    tags,
                    &[],
                ),
            ));
            out.push((
                format!("{subnet}RouteTableAssociation"),
                resource(
                    "AWS::EC2::SubnetRouteTableAssociation",
                    json!({ "SubnetId": { "Ref": subnet }, "RouteTableId": { "Ref": table } }),
                    None,
                    &[],
                ),
            ));
        }
    }
    out
}

fn resource(
    resource_type: &str,
    properties: Value,
    tags: Option<&Value>,
    depends_on: &[&str],
) -> TemplateResource {
    let mut properties = match properties {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    if let Some(tags) = tags {
        properties.insert("Tags".into(), tags.clone());
    }
    TemplateResource {
        resource_type: resource_type.to_string(),
        properties,
        depends_on: depends_on.iter().map(|d| d.to_string()).collect(),
        deletion_policy: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_limit_leaves_room_for_every_subnet() {
        assert_eq!(max_prefix_len(1), 23);
        assert_eq!(max_prefix_len(2), 22);
        assert_eq!(max_prefix_len(3), 21);
        assert_eq!(max_prefix_len(6), 20);
    }

    #[test]
    fn two_zones_get_four_subnets_and_one_nat() {
        let out = resources("DemoNetwork", &json!("10.0.0.0/16"), 2, None);
        let subnets: Vec<&str> = out
            .iter()
            .filter(|(_, r)| r.resource_type == "AWS::EC2::Subnet")
            .map(|(id, _)| id.as_str())
            .collect();
        assert_eq!(
            subnets,
            vec![
                "DemoNetworkPublicSubnet1",
                "DemoNetworkPublicSubnet2",
                "DemoNetworkPrivateSubnet1",
                "DemoNetworkPrivateSubnet2",
            ]
        );
        let nat_gateways = out
            .iter()
            .filter(|(_, r)| r.resource_type == "AWS::EC2::NatGateway")
            .count();
        assert_eq!(nat_gateways, 1);

        let (_, private) = out
            .iter()
            .find(|(id, _)| id == "DemoNetworkPrivateSubnet2")
            .unwrap();
        assert_eq!(
            private.properties["CidrBlock"],
            json!({ "Fn::Select": [3, { "Fn::Cidr": ["10.0.0.0/16", 4, "8"] }] })
        );
        assert_eq!(private.properties["MapPublicIpOnLaunch"], json!(false));
    }

    #[test]
    fn private_route_goes_through_nat() {
        let out = resources("DemoNetwork", &json!("10.0.0.0/16"), 1, None);
        let (_, route) = out
            .iter()
            .find(|(id, _)| id == "DemoNetworkPrivateDefaultRoute")
            .unwrap();
        assert_eq!(
            route.properties["NatGatewayId"],
            json!({ "Ref": "DemoNetworkNatGateway" })
        );
        let (_, public) = out
            .iter()
            .find(|(id, _)| id == "DemoNetworkPublicDefaultRoute")
            .unwrap();
        assert_eq!(public.depends_on, vec!["DemoNetworkInternetGatewayAttachment"]);
    }
}
